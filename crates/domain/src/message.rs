//! Trigger message — the body published by the scheduler for each firing.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::execution::LogId;
use crate::id::AutomationId;
use crate::time::Timestamp;

/// `{ "log_id": ..., "automation_id": ..., "triggered_at": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerMessage {
    pub log_id: LogId,
    pub automation_id: AutomationId,
    /// The instant the automation was due, not the publish time.
    pub triggered_at: Timestamp,
}

#[derive(Deserialize)]
struct RawTriggerMessage {
    #[serde(default)]
    log_id: Option<String>,
    #[serde(default)]
    automation_id: Option<String>,
    #[serde(default)]
    triggered_at: Option<Timestamp>,
}

impl TriggerMessage {
    #[must_use]
    pub fn new(automation_id: AutomationId, triggered_at: Timestamp) -> Self {
        Self {
            log_id: LogId::generate(),
            automation_id,
            triggered_at,
        }
    }

    /// Serialize to the broker body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error (not expected for this shape).
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse and validate a broker body.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when the body is not JSON, a required field
    /// is missing or empty (a zero `triggered_at` counts as missing), or the
    /// automation id is not a UUID.
    pub fn decode(body: &[u8]) -> Result<Self, MessageError> {
        let raw: RawTriggerMessage = serde_json::from_slice(body).map_err(MessageError::Json)?;

        let log_id = raw
            .log_id
            .filter(|v| !v.trim().is_empty())
            .ok_or(MessageError::MissingField("log_id"))?;
        let automation_id = raw
            .automation_id
            .filter(|v| !v.trim().is_empty())
            .ok_or(MessageError::MissingField("automation_id"))?;
        // Zero-valued instants (year 1, the Unix epoch) count as unset.
        let triggered_at = raw
            .triggered_at
            .filter(|at| at.timestamp() > 0)
            .ok_or(MessageError::MissingField("triggered_at"))?;

        Ok(Self {
            log_id: LogId::from(log_id),
            automation_id: automation_id
                .parse()
                .map_err(MessageError::InvalidAutomationId)?,
            triggered_at,
        })
    }
}
