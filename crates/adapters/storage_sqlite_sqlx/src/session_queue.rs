//! Durable session queue on top of the same `SQLite` database.
//!
//! Messages are grouped by session id. A consumer holds a session through a
//! lease row in `queue_session_locks`; the lease is renewed on every
//! receive or settle and expires if the consumer dies. Messages of a session
//! whose lease expired are released back to the queue on the next accept.
//! A message delivered `max_delivery_count` times without completion is
//! dead-lettered instead of redelivered.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{Sqlite, SqlitePool, Transaction};

use cadence_app::ports::{MessageSender, ReceivedMessage, Session, SessionSource};
use cadence_domain::error::CadenceError;
use cadence_domain::time::{self, Timestamp};

use crate::codec;
use crate::error::QueueError;

const ENQUEUE: &str = r"
INSERT INTO queue_messages (message_id, queue, session_id, body, enqueued_at, available_at)
VALUES (?, ?, ?, ?, ?, ?)";

const EXPIRE_LEASES: &str = "DELETE FROM queue_session_locks WHERE queue = ? AND locked_until < ?";

const RELEASE_ORPHANS: &str = r"
UPDATE queue_messages SET in_flight = 0
WHERE queue = ? AND in_flight = 1
  AND session_id NOT IN (SELECT session_id FROM queue_session_locks WHERE queue = ?)";

const NEXT_FREE_SESSION: &str = r"
SELECT m.session_id FROM queue_messages m
WHERE m.queue = ? AND m.dead_lettered = 0 AND m.in_flight = 0 AND m.available_at <= ?
  AND NOT EXISTS (
      SELECT 1 FROM queue_session_locks l WHERE l.queue = m.queue AND l.session_id = m.session_id
  )
ORDER BY m.available_at, m.seq
LIMIT 1";

const TAKE_LEASE: &str =
    "INSERT INTO queue_session_locks (queue, session_id, holder, locked_until) VALUES (?, ?, ?, ?)";

const RENEW_LEASE: &str = r"
UPDATE queue_session_locks SET locked_until = ?
WHERE queue = ? AND session_id = ? AND holder = ?";

const READY_IN_SESSION: &str = r"
SELECT seq, message_id, body, delivery_count FROM queue_messages
WHERE queue = ? AND session_id = ? AND dead_lettered = 0 AND in_flight = 0 AND available_at <= ?
ORDER BY seq
LIMIT ?";

const MARK_IN_FLIGHT: &str = "UPDATE queue_messages SET in_flight = 1, delivery_count = ? WHERE seq = ?";

const DEAD_LETTER: &str = "UPDATE queue_messages SET dead_lettered = 1, in_flight = 0 WHERE seq = ?";

const COMPLETE: &str = "DELETE FROM queue_messages WHERE queue = ? AND message_id = ?";

const ABANDON: &str = "UPDATE queue_messages SET in_flight = 0 WHERE queue = ? AND message_id = ?";

const RELEASE_SESSION_MESSAGES: &str =
    "UPDATE queue_messages SET in_flight = 0 WHERE queue = ? AND session_id = ? AND in_flight = 1";

const RELEASE_LEASE: &str = "DELETE FROM queue_session_locks WHERE queue = ? AND session_id = ? AND holder = ?";

/// Tuning of the `SQLite` queue.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Logical queue name; several queues may share one database.
    pub queue: String,
    /// How long a session stays held without activity from its consumer.
    pub lease: Duration,
    /// Deliveries after which a message is dead-lettered.
    pub max_delivery_count: u32,
    /// Sleep between polls while waiting for work.
    pub poll_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue: "automate_queue".to_string(),
            lease: Duration::from_secs(300),
            max_delivery_count: 10,
            poll_interval: Duration::from_millis(250),
        }
    }
}

fn lease_until(now: Timestamp, lease: Duration) -> Timestamp {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_add_signed(lease))
        .unwrap_or(now)
}

/// Producer and session source for the `SQLite` queue.
#[derive(Debug, Clone)]
pub struct SqliteSessionQueue {
    pool: SqlitePool,
    settings: Arc<QueueSettings>,
    consumer: Arc<str>,
}

impl SqliteSessionQueue {
    /// Create a queue handle. Each handle is its own consumer identity.
    #[must_use]
    pub fn new(pool: SqlitePool, settings: QueueSettings) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            consumer: Arc::from(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Messages neither completed nor dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Dispatch`] if the query fails.
    pub async fn pending(&self) -> Result<u64, CadenceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = ? AND dead_lettered = 0")
                .bind(&self.settings.queue)
                .fetch_one(&self.pool)
                .await
                .map_err(QueueError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Messages that exhausted their deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Dispatch`] if the query fails.
    pub async fn dead_lettered(&self) -> Result<Vec<ReceivedMessage>, CadenceError> {
        let rows: Vec<(String, String, Vec<u8>, i64)> = sqlx::query_as(
            "SELECT message_id, session_id, body, delivery_count FROM queue_messages WHERE queue = ? AND dead_lettered = 1 ORDER BY seq",
        )
        .bind(&self.settings.queue)
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::from)?;

        Ok(rows
            .into_iter()
            .map(|(message_id, session_id, body, delivery_count)| ReceivedMessage {
                message_id,
                session_id,
                body,
                delivery_count: u32::try_from(delivery_count).unwrap_or(u32::MAX),
            })
            .collect())
    }

    async fn enqueue(&self, session_id: &str, body: Vec<u8>, available_at: Timestamp) -> Result<(), QueueError> {
        sqlx::query(ENQUEUE)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&self.settings.queue)
            .bind(session_id)
            .bind(body)
            .bind(codec::timestamp(time::now()))
            .bind(codec::timestamp(available_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_accept(&self) -> Result<Option<SqliteSession>, QueueError> {
        let now = time::now();
        let stamp = codec::timestamp(now);
        let queue = self.settings.queue.as_str();
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(EXPIRE_LEASES)
            .bind(queue)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if expired > 0 {
            tracing::warn!(queue, expired, "session leases expired");
        }
        sqlx::query(RELEASE_ORPHANS)
            .bind(queue)
            .bind(queue)
            .execute(&mut *tx)
            .await?;

        let candidate: Option<String> = sqlx::query_scalar(NEXT_FREE_SESSION)
            .bind(queue)
            .bind(&stamp)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(session_id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(TAKE_LEASE)
            .bind(queue)
            .bind(&session_id)
            .bind(&*self.consumer)
            .bind(codec::timestamp(lease_until(now, self.settings.lease)))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(queue, session_id = %session_id, "session accepted");
        Ok(Some(SqliteSession {
            pool: self.pool.clone(),
            settings: Arc::clone(&self.settings),
            consumer: Arc::clone(&self.consumer),
            session_id,
        }))
    }
}

impl MessageSender for SqliteSessionQueue {
    async fn send(&self, session_id: &str, body: Vec<u8>) -> Result<(), CadenceError> {
        self.enqueue(session_id, body, time::now()).await?;
        Ok(())
    }

    async fn schedule_at(&self, session_id: &str, body: Vec<u8>, deliver_at: Timestamp) -> Result<(), CadenceError> {
        self.enqueue(session_id, body, deliver_at).await?;
        Ok(())
    }
}

impl SessionSource for SqliteSessionQueue {
    type Session = SqliteSession;

    async fn accept_next_session(&self, timeout: Duration) -> Result<Option<SqliteSession>, CadenceError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(session) = self.try_accept().await? {
                return Ok(Some(session));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(remaining.min(self.settings.poll_interval)).await;
        }
    }
}

/// A session held by this consumer until [`Session::close`] or lease expiry.
#[derive(Debug)]
pub struct SqliteSession {
    pool: SqlitePool,
    settings: Arc<QueueSettings>,
    consumer: Arc<str>,
    session_id: String,
}

impl SqliteSession {
    async fn renew(&self, tx: &mut Transaction<'_, Sqlite>, now: Timestamp) -> Result<(), QueueError> {
        let renewed = sqlx::query(RENEW_LEASE)
            .bind(codec::timestamp(lease_until(now, self.settings.lease)))
            .bind(&self.settings.queue)
            .bind(&self.session_id)
            .bind(&*self.consumer)
            .execute(&mut **tx)
            .await?
            .rows_affected();
        if renewed == 0 {
            return Err(QueueError::LeaseLost {
                session_id: self.session_id.clone(),
            });
        }
        Ok(())
    }

    async fn take_available(&self, max: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = time::now();
        let mut tx = self.pool.begin().await?;
        self.renew(&mut tx, now).await?;

        let rows: Vec<(i64, String, Vec<u8>, i64)> = sqlx::query_as(READY_IN_SESSION)
            .bind(&self.settings.queue)
            .bind(&self.session_id)
            .bind(codec::timestamp(now))
            .bind(i64::try_from(max).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await?;

        let mut batch = Vec::with_capacity(rows.len());
        for (seq, message_id, body, delivered) in rows {
            let delivery_count = u32::try_from(delivered).unwrap_or(u32::MAX);
            if delivery_count >= self.settings.max_delivery_count {
                sqlx::query(DEAD_LETTER).bind(seq).execute(&mut *tx).await?;
                tracing::warn!(
                    session_id = %self.session_id,
                    message_id = %message_id,
                    delivery_count,
                    "message dead-lettered"
                );
                continue;
            }
            let delivery_count = delivery_count + 1;
            sqlx::query(MARK_IN_FLIGHT)
                .bind(i64::from(delivery_count))
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            batch.push(ReceivedMessage {
                message_id,
                session_id: self.session_id.clone(),
                body,
                delivery_count,
            });
        }
        tx.commit().await?;
        Ok(batch)
    }

    async fn settle(&self, statement: &'static str, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        self.renew(&mut tx, time::now()).await?;
        sqlx::query(statement)
            .bind(&self.settings.queue)
            .bind(&message.message_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl Session for SqliteSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn receive_batch(&self, max: usize, timeout: Duration) -> Result<Vec<ReceivedMessage>, CadenceError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let batch = self.take_available(max).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(batch);
            }
            tokio::time::sleep(remaining.min(self.settings.poll_interval)).await;
        }
    }

    async fn complete(&self, message: &ReceivedMessage) -> Result<(), CadenceError> {
        self.settle(COMPLETE, message).await?;
        Ok(())
    }

    async fn abandon(&self, message: &ReceivedMessage) -> Result<(), CadenceError> {
        self.settle(ABANDON, message).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CadenceError> {
        let mut tx = self.pool.begin().await.map_err(QueueError::from)?;
        sqlx::query(RELEASE_SESSION_MESSAGES)
            .bind(&self.settings.queue)
            .bind(&self.session_id)
            .execute(&mut *tx)
            .await
            .map_err(QueueError::from)?;
        sqlx::query(RELEASE_LEASE)
            .bind(&self.settings.queue)
            .bind(&self.session_id)
            .bind(&*self.consumer)
            .execute(&mut *tx)
            .await
            .map_err(QueueError::from)?;
        tx.commit().await.map_err(QueueError::from)?;
        Ok(())
    }
}
