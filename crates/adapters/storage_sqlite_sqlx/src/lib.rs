//! # cadence-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the port traits defined in `cadence-app::ports`:
//!   `ClaimStore`, `DefinitionReader`, `LogStore`, and the broker ports
//!   (`MessageSender`, `SessionSource`, `Session`) as a durable session queue
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `cadence-app` (for port traits) and `cadence-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod automation_repo;
pub mod definition_repo;
pub mod error;
pub mod execution_log_repo;
pub mod pool;
pub mod session_queue;

mod codec;
