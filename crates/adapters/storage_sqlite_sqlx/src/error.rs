//! Storage-specific error type wrapping sqlx errors.

use cadence_domain::error::CadenceError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to (de)serialize a stored JSON value.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for CadenceError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Errors originating from the `SQLite` session queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue database error")]
    Database(#[from] sqlx::Error),

    /// The session lease expired and was taken over by another consumer.
    #[error("session {session_id} is no longer held by this consumer")]
    LeaseLost { session_id: String },
}

impl From<QueueError> for CadenceError {
    fn from(err: QueueError) -> Self {
        Self::Dispatch(Box::new(err))
    }
}
