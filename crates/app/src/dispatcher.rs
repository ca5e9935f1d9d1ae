//! Session dispatcher — bounded, cooperative consumption of broker sessions.
//!
//! Two nested bounds protect downstream action endpoints:
//!
//! - at most `session_pool` sessions are held at once (slot tokens),
//! - inside each session at most `process_pool` messages run at once
//!   (a semaphore).
//!
//! Cancellation only stops new session acceptance. Sessions already
//! accepted finish their current batch and every spawned task is joined
//! before [`SessionDispatcher::run`] returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::ports::{ReceivedMessage, Session, SessionSource};

/// What to do with a message after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge and remove the message.
    Complete,
    /// Return the message for redelivery.
    Abandon,
}

/// Per-message business logic driven by the dispatcher.
pub trait MessageProcessor {
    fn process(&self, message: &ReceivedMessage) -> impl Future<Output = Disposition> + Send;
}

/// Tuning knobs of a [`SessionDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub session_pool: usize,
    pub batch_size: usize,
    pub process_pool: usize,
    /// Pause after an accept timeout or error.
    pub retry_delay: Duration,
    pub accept_timeout: Duration,
    pub receive_timeout: Duration,
    /// Pause when every session slot is taken.
    pub idle_poll: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            session_pool: 20,
            batch_size: 5,
            process_pool: 1,
            retry_delay: Duration::from_secs(5),
            accept_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(10),
            idle_poll: Duration::from_millis(100),
        }
    }
}

impl DispatcherSettings {
    /// Replace zero sizes with their defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            session_pool: non_zero(self.session_pool, defaults.session_pool),
            batch_size: non_zero(self.batch_size, defaults.batch_size),
            process_pool: non_zero(self.process_pool, defaults.process_pool),
            ..self
        }
    }
}

fn non_zero(value: usize, fallback: usize) -> usize {
    if value == 0 { fallback } else { value }
}

#[derive(Debug)]
struct SlotToken(usize);

/// Hands its slot back to the pool when the session worker ends, even on panic.
struct SlotGuard {
    token: Option<SlotToken>,
    slots: mpsc::UnboundedSender<SlotToken>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let _ = self.slots.send(token);
        }
    }
}

/// Accepts sessions and fans their messages out to a [`MessageProcessor`].
pub struct SessionDispatcher<Src, P> {
    source: Src,
    processor: Arc<P>,
    settings: DispatcherSettings,
}

impl<Src, P> SessionDispatcher<Src, P>
where
    Src: SessionSource + Sync,
    P: MessageProcessor + Send + Sync + 'static,
{
    pub fn new(source: Src, processor: P, settings: DispatcherSettings) -> Self {
        Self {
            source,
            processor: Arc::new(processor),
            settings: settings.normalized(),
        }
    }

    /// Run until `cancel` fires, then wait for every accepted session.
    pub async fn run(&self, cancel: CancellationToken) {
        let settings = &self.settings;
        let (slots_tx, mut slots_rx) = mpsc::unbounded_channel();
        for slot in 1..=settings.session_pool {
            let _ = slots_tx.send(SlotToken(slot));
        }
        let mut sessions = JoinSet::new();

        tracing::info!(
            session_pool = settings.session_pool,
            process_pool = settings.process_pool,
            batch_size = settings.batch_size,
            "session dispatcher started"
        );

        while !cancel.is_cancelled() {
            while let Some(joined) = sessions.try_join_next() {
                report_join(joined);
            }

            let Ok(token) = slots_rx.try_recv() else {
                if pause(&cancel, settings.idle_poll).await {
                    break;
                }
                continue;
            };

            match self.source.accept_next_session(settings.accept_timeout).await {
                Ok(Some(session)) => {
                    let guard = SlotGuard {
                        token: Some(token),
                        slots: slots_tx.clone(),
                    };
                    sessions.spawn(run_session(
                        session,
                        Arc::clone(&self.processor),
                        settings.clone(),
                        guard,
                    ));
                }
                Ok(None) => {
                    let _ = slots_tx.send(token);
                    tracing::debug!(retry_in = ?settings.retry_delay, "session accept timed out");
                    if pause(&cancel, settings.retry_delay).await {
                        break;
                    }
                }
                Err(err) => {
                    let _ = slots_tx.send(token);
                    tracing::warn!(error = %err, retry_in = ?settings.retry_delay, "failed to accept session");
                    if pause(&cancel, settings.retry_delay).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(in_flight = sessions.len(), "shutting down, waiting for active sessions");
        while let Some(joined) = sessions.join_next().await {
            report_join(joined);
        }
        tracing::info!("session dispatcher stopped");
    }
}

/// Sleep for `delay`; returns `true` when cancelled first.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(delay) => false,
    }
}

fn report_join<T>(joined: Result<T, JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "dispatcher task panicked");
    }
}

async fn run_session<S, P>(session: S, processor: Arc<P>, settings: DispatcherSettings, guard: SlotGuard)
where
    S: Session + Send + Sync + 'static,
    P: MessageProcessor + Send + Sync + 'static,
{
    let slot = guard.token.as_ref().map_or(0, |token| token.0);
    let session = Arc::new(session);
    let session_id = session.session_id().to_string();
    tracing::debug!(slot, session_id = %session_id, "session accepted");

    let batch = match session
        .receive_batch(settings.batch_size, settings.receive_timeout)
        .await
    {
        Ok(batch) => batch,
        Err(err) => {
            tracing::warn!(slot, session_id = %session_id, error = %err, "failed to receive messages");
            Vec::new()
        }
    };
    let received = batch.len();

    if !batch.is_empty() {
        let permits = Arc::new(Semaphore::new(settings.process_pool));
        let mut handlers = JoinSet::new();
        for message in batch {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let session = Arc::clone(&session);
            let processor = Arc::clone(&processor);
            handlers.spawn(async move {
                let _permit = permit;
                let disposition = processor.process(&message).await;
                let acked = match disposition {
                    Disposition::Complete => session.complete(&message).await,
                    Disposition::Abandon => session.abandon(&message).await,
                };
                if let Err(err) = acked {
                    tracing::warn!(message_id = %message.message_id, ?disposition, error = %err, "failed to acknowledge message");
                }
            });
        }
        while let Some(joined) = handlers.join_next().await {
            report_join(joined);
        }
    }

    if let Err(err) = session.close().await {
        tracing::warn!(slot, session_id = %session_id, error = %err, "failed to close session");
    }
    tracing::info!(slot, session_id = %session_id, messages = received, "session closed");
    drop(guard);
}
