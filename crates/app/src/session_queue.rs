//! In-process session queue backed by a mutex-guarded map and a tokio [`Notify`].
//!
//! Implements the dispatch ports without IO: messages are grouped by
//! session id, each session is held by at most one consumer, deferred
//! messages become visible at their delivery time, and abandoned or
//! unacknowledged messages go back to the head of their session.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use cadence_domain::error::CadenceError;
use cadence_domain::time::{self, Timestamp};

use crate::ports::{MessageSender, ReceivedMessage, Session, SessionSource};

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    message_id: String,
    body: Vec<u8>,
    available_at: Timestamp,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct SessionState {
    held: bool,
    queued: VecDeque<Stored>,
    in_flight: HashMap<String, Stored>,
}

impl SessionState {
    /// Earliest delivery time among queued messages of an unheld session.
    fn next_visible(&self) -> Option<Timestamp> {
        if self.held {
            return None;
        }
        self.queued.iter().map(|m| m.available_at).min()
    }

    fn has_available(&self, now: Timestamp) -> bool {
        self.queued.iter().any(|m| m.available_at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: Mutex<BTreeMap<String, SessionState>>,
    notify: Notify,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, session_id: &str, body: Vec<u8>, available_at: Timestamp) {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock()
            .entry(session_id.to_string())
            .or_default()
            .queued
            .push_back(Stored {
                seq,
                message_id: format!("msg-{seq}"),
                body,
                available_at,
                delivery_count: 0,
            });
        self.notify.notify_waiters();
    }
}

/// How long to wait before the next deferred message may become visible.
fn until(at: Option<Timestamp>, now: Timestamp) -> Option<Duration> {
    at.map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
}

/// In-memory, session-partitioned message queue.
#[derive(Debug, Clone, Default)]
pub struct InProcessSessionQueue {
    inner: Arc<Inner>,
}

impl InProcessSessionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet completed, queued or in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .values()
            .map(|s| s.queued.len() + s.in_flight.len())
            .sum()
    }

    fn try_accept(&self, now: Timestamp) -> Result<InProcessSession, Option<Timestamp>> {
        let mut sessions = self.inner.lock();
        let ready = sessions
            .iter_mut()
            .find(|(_, state)| !state.held && state.has_available(now));
        if let Some((session_id, state)) = ready {
            state.held = true;
            return Ok(InProcessSession {
                inner: Arc::clone(&self.inner),
                session_id: session_id.clone(),
            });
        }
        Err(sessions.values().filter_map(SessionState::next_visible).min())
    }
}

impl MessageSender for InProcessSessionQueue {
    fn send(
        &self,
        session_id: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        self.inner.enqueue(session_id, body, time::now());
        async { Ok(()) }
    }

    fn schedule_at(
        &self,
        session_id: &str,
        body: Vec<u8>,
        deliver_at: Timestamp,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        self.inner.enqueue(session_id, body, deliver_at);
        async { Ok(()) }
    }
}

impl SessionSource for InProcessSessionQueue {
    type Session = InProcessSession;

    async fn accept_next_session(
        &self,
        timeout: Duration,
    ) -> Result<Option<InProcessSession>, CadenceError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = time::now();
            let next_visible = match self.try_accept(now) {
                Ok(session) => return Ok(Some(session)),
                Err(next_visible) => next_visible,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let wait = until(next_visible, now).map_or(remaining, |d| d.min(remaining));
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }
}

/// A session exclusively held from an [`InProcessSessionQueue`].
#[derive(Debug)]
pub struct InProcessSession {
    inner: Arc<Inner>,
    session_id: String,
}

impl InProcessSession {
    fn take_available(&self, max: usize, now: Timestamp) -> Result<Vec<ReceivedMessage>, Option<Timestamp>> {
        let mut sessions = self.inner.lock();
        let Some(state) = sessions.get_mut(&self.session_id) else {
            return Err(None);
        };

        let mut taken = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.queued.len());
        while let Some(mut message) = state.queued.pop_front() {
            if taken.len() < max && message.available_at <= now {
                message.delivery_count += 1;
                taken.push(ReceivedMessage {
                    message_id: message.message_id.clone(),
                    session_id: self.session_id.clone(),
                    body: message.body.clone(),
                    delivery_count: message.delivery_count,
                });
                state.in_flight.insert(message.message_id.clone(), message);
            } else {
                remaining.push_back(message);
            }
        }
        state.queued = remaining;

        if taken.is_empty() {
            Err(state.queued.iter().map(|m| m.available_at).min())
        } else {
            Ok(taken)
        }
    }

    fn settle(&self, message_id: &str, requeue: bool) {
        let mut sessions = self.inner.lock();
        if let Some(state) = sessions.get_mut(&self.session_id)
            && let Some(message) = state.in_flight.remove(message_id)
            && requeue
        {
            state.queued.push_front(message);
        }
        drop(sessions);
        if requeue {
            self.inner.notify.notify_waiters();
        }
    }
}

impl Session for InProcessSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn receive_batch(
        &self,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, CadenceError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = time::now();
            let next_visible = match self.take_available(max, now) {
                Ok(batch) => return Ok(batch),
                Err(next_visible) => next_visible,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let wait = until(next_visible, now).map_or(remaining, |d| d.min(remaining));
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    fn complete(
        &self,
        message: &ReceivedMessage,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        self.settle(&message.message_id, false);
        async { Ok(()) }
    }

    fn abandon(
        &self,
        message: &ReceivedMessage,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        self.settle(&message.message_id, true);
        async { Ok(()) }
    }

    fn close(&self) -> impl Future<Output = Result<(), CadenceError>> + Send {
        let mut sessions = self.inner.lock();
        if let Some(state) = sessions.get_mut(&self.session_id) {
            // Unacknowledged messages go back in their original order.
            let mut unacked: Vec<Stored> = state.in_flight.drain().map(|(_, m)| m).collect();
            unacked.sort_by_key(|m| std::cmp::Reverse(m.seq));
            for message in unacked {
                state.queued.push_front(message);
            }
            state.held = false;
            if state.queued.is_empty() {
                sessions.remove(&self.session_id);
            }
        }
        drop(sessions);
        self.inner.notify.notify_waiters();
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn should_accept_session_with_ready_messages() {
        let queue = InProcessSessionQueue::new();
        queue.send("alpha", b"one".to_vec()).await.unwrap();

        let session = queue.accept_next_session(SHORT).await.unwrap().unwrap();
        let batch = session.receive_batch(10, SHORT).await.unwrap();

        assert_eq!(session.session_id(), "alpha");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, b"one");
        assert_eq!(batch[0].delivery_count, 1);
    }

    #[tokio::test]
    async fn should_time_out_when_no_session_is_ready() {
        let queue = InProcessSessionQueue::new();
        let accepted = queue.accept_next_session(SHORT).await.unwrap();
        assert!(accepted.is_none());
    }

    #[tokio::test]
    async fn should_hand_a_session_to_one_holder_at_a_time() {
        let queue = InProcessSessionQueue::new();
        queue.send("alpha", b"one".to_vec()).await.unwrap();

        let first = queue.accept_next_session(SHORT).await.unwrap();
        let second = queue.accept_next_session(SHORT).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn should_wake_waiting_acceptor_when_message_arrives() {
        let queue = InProcessSessionQueue::new();
        let publisher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.send("alpha", b"late".to_vec()).await.unwrap();
        });

        let accepted = queue
            .accept_next_session(Duration::from_secs(2))
            .await
            .unwrap();

        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn should_hide_deferred_message_until_its_time() {
        let queue = InProcessSessionQueue::new();
        let deliver_at = time::now() + chrono::Duration::milliseconds(100);
        queue
            .schedule_at("alpha", b"later".to_vec(), deliver_at)
            .await
            .unwrap();

        assert!(queue.accept_next_session(SHORT).await.unwrap().is_none());
        let session = queue
            .accept_next_session(Duration::from_secs(2))
            .await
            .unwrap();

        assert!(session.is_some());
        assert!(time::now() >= deliver_at);
    }

    #[tokio::test]
    async fn should_redeliver_abandoned_message_first() {
        let queue = InProcessSessionQueue::new();
        queue.send("alpha", b"one".to_vec()).await.unwrap();
        queue.send("alpha", b"two".to_vec()).await.unwrap();

        let session = queue.accept_next_session(SHORT).await.unwrap().unwrap();
        let batch = session.receive_batch(1, SHORT).await.unwrap();
        session.abandon(&batch[0]).await.unwrap();
        let again = session.receive_batch(1, SHORT).await.unwrap();

        assert_eq!(again[0].body, b"one");
        assert_eq!(again[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn should_release_unacknowledged_messages_on_close() {
        let queue = InProcessSessionQueue::new();
        queue.send("alpha", b"one".to_vec()).await.unwrap();
        queue.send("alpha", b"two".to_vec()).await.unwrap();

        let session = queue.accept_next_session(SHORT).await.unwrap().unwrap();
        let batch = session.receive_batch(10, SHORT).await.unwrap();
        session.complete(&batch[1]).await.unwrap();
        session.close().await.unwrap();

        let session = queue.accept_next_session(SHORT).await.unwrap().unwrap();
        let batch = session.receive_batch(10, SHORT).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, b"one");
    }

    #[tokio::test]
    async fn should_forget_session_once_drained() {
        let queue = InProcessSessionQueue::new();
        queue.send("alpha", b"one".to_vec()).await.unwrap();

        let session = queue.accept_next_session(SHORT).await.unwrap().unwrap();
        let batch = session.receive_batch(10, SHORT).await.unwrap();
        session.complete(&batch[0]).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(queue.pending(), 0);
        assert!(queue.accept_next_session(SHORT).await.unwrap().is_none());
    }
}
