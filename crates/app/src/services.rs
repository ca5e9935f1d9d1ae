//! Application services — use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod lock_reconciler;
pub mod log_service;
pub mod message_handler;
pub mod scheduler_cycle;
pub mod snapshot_loader;
