//! Execution log — the audit record of one automation firing.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::id::AutomationId;
use crate::time::Timestamp;

const LOG_ID_SUFFIX_LEN: usize = 16;
const LOG_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Time-sortable execution log identifier.
///
/// Always 32 characters: 16 lower-case hex digits of a monotonic
/// nanosecond clock followed by 16 random `[a-z0-9]` characters.
/// Ids generated later in the same process sort after earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

impl LogId {
    /// Total length of a generated id.
    pub const LEN: usize = 32;

    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        let tick = next_tick(wall_clock_nanos());
        let mut rng = rand::rng();
        let suffix: String = (0..LOG_ID_SUFFIX_LEN)
            .map(|_| char::from(LOG_ID_ALPHABET[rng.random_range(0..LOG_ID_ALPHABET.len())]))
            .collect();
        Self(format!("{tick:016x}{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LogId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn wall_clock_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

/// Never returns the same value twice and never goes backwards,
/// even if the wall clock does.
fn next_tick(now: u64) -> u64 {
    let mut last = LAST_TICK.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TICK.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Outcome of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl ExecutionStatus {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An execution status string that is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown execution status: {0}")]
pub struct UnknownExecutionStatus(pub String);

impl FromStr for ExecutionStatus {
    type Err = UnknownExecutionStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownExecutionStatus(other.to_string())),
        }
    }
}

/// One firing of an automation, upserted by `log_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub log_id: LogId,
    pub automation_id: AutomationId,
    pub triggered_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
    /// Serialized [`AutomationSnapshot`](crate::snapshot::AutomationSnapshot).
    pub config_snapshot: Option<String>,
}

impl ExecutionLog {
    /// A fresh PENDING record.
    #[must_use]
    pub fn pending(log_id: LogId, automation_id: AutomationId, triggered_at: Timestamp) -> Self {
        Self {
            log_id,
            automation_id,
            triggered_at,
            finished_at: None,
            status: ExecutionStatus::Pending,
            error_message: None,
            config_snapshot: None,
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: String) -> Self {
        self.config_snapshot = Some(snapshot);
        self
    }

    /// Mark the execution as succeeded at `finished_at`.
    pub fn succeed(&mut self, finished_at: Timestamp) {
        self.status = ExecutionStatus::Success;
        self.finished_at = Some(finished_at);
        self.error_message = None;
    }

    /// Mark the execution as failed at `finished_at`.
    pub fn fail(&mut self, finished_at: Timestamp, message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.finished_at = Some(finished_at);
        self.error_message = Some(message.into());
    }
}
