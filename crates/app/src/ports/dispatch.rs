//! Dispatch ports — a session-partitioned message broker.
//!
//! Messages sharing a session id are delivered in order to one holder at a
//! time. The scheduler side only needs [`MessageSender`]; the worker side
//! drives [`SessionSource`] and [`Session`].

use std::future::Future;
use std::time::Duration;

use cadence_domain::error::CadenceError;
use cadence_domain::time::Timestamp;

/// Publishes message bodies under a session key.
pub trait MessageSender {
    /// Publish for immediate delivery.
    fn send(
        &self,
        session_id: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Publish with delivery deferred until `deliver_at`.
    fn schedule_at(
        &self,
        session_id: &str,
        body: Vec<u8>,
        deliver_at: Timestamp,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;
}

/// A message handed out by a [`Session`], to be completed or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub session_id: String,
    pub body: Vec<u8>,
    /// 1 on first delivery.
    pub delivery_count: u32,
}

/// Hands out exclusive sessions that have messages ready.
pub trait SessionSource {
    type Session: Session + Send + Sync + 'static;

    /// Wait up to `timeout` for a session with available messages.
    ///
    /// `Ok(None)` is a timeout, a normal condition.
    fn accept_next_session(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Self::Session>, CadenceError>> + Send;
}

/// An exclusively held broker session.
pub trait Session {
    fn session_id(&self) -> &str;

    /// Receive up to `max` messages, waiting at most `timeout` for the first.
    ///
    /// An empty batch on timeout is normal.
    fn receive_batch(
        &self,
        max: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<ReceivedMessage>, CadenceError>> + Send;

    /// Remove the message permanently.
    fn complete(
        &self,
        message: &ReceivedMessage,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Return the message to the queue for redelivery.
    fn abandon(
        &self,
        message: &ReceivedMessage,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Release the session so another holder may accept it.
    fn close(&self) -> impl Future<Output = Result<(), CadenceError>> + Send;
}
