//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`CadenceError`]
//! via `#[from]` (or an explicit `From` impl for boxed adapter errors).

use std::error::Error as StdError;

/// Boxed, thread-safe error used for adapter-specific sources.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Top-level error shared by ports, services and adapters.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] MessageError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    ActionInvocation(#[from] ActionInvocationError),

    /// The relational store failed (connection, query, decode, …).
    #[error("storage error")]
    Storage(#[source] BoxError),

    /// The message broker failed to publish, accept or acknowledge.
    #[error("dispatch error")]
    Dispatch(#[source] BoxError),
}

/// Domain invariant violations detected when building a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("delivery channel must not be empty")]
    EmptyChannel,

    #[error("invoke url must not be empty")]
    EmptyInvokeUrl,
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// An optimistic update lost the race against a concurrent writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} was modified concurrently (expected version {expected})")]
pub struct ConflictError {
    pub entity: &'static str,
    pub id: String,
    pub expected: i64,
}

/// Recurrence parameters that cannot produce a next run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("missing {0} for this frequency")]
    MissingField(&'static str),

    #[error("invalid day_of_week: {0}")]
    InvalidDayOfWeek(String),

    #[error("invalid day_of_month: {0}")]
    InvalidDayOfMonth(u32),

    #[error("invalid month_of_year: {0}")]
    InvalidMonthOfYear(u32),

    #[error("no {0} occurrence found within the search horizon")]
    NoOccurrence(&'static str),
}

/// A broker message body that does not match the trigger schema.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid message json")]
    Json(#[source] serde_json::Error),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("automation_id is not a valid identifier")]
    InvalidAutomationId(#[source] uuid::Error),
}

/// An external action endpoint rejected or failed the invocation.
#[derive(Debug, thiserror::Error)]
pub enum ActionInvocationError {
    #[error("action endpoint {url} responded with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("action endpoint {url} could not be reached")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Automation",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Automation abc not found");
    }

    #[test]
    fn should_wrap_schedule_error_into_invalid_schedule() {
        let err: CadenceError = ScheduleError::InvalidDayOfWeek("funday".to_string()).into();
        assert!(matches!(err, CadenceError::InvalidSchedule(_)));
        assert_eq!(err.to_string(), "invalid schedule: invalid day_of_week: funday");
    }

    #[test]
    fn should_wrap_message_error_into_malformed_message() {
        let err: CadenceError = MessageError::MissingField("log_id").into();
        assert!(matches!(err, CadenceError::MalformedMessage(_)));
        assert_eq!(err.to_string(), "malformed message: log_id is required");
    }

    #[test]
    fn should_include_status_and_body_in_invocation_error() {
        let err = ActionInvocationError::Status {
            url: "http://hooks.local/run".to_string(),
            status: 503,
            body: "{\"error\":\"busy\"}".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("busy"));
    }
}
