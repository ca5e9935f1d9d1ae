//! # cadence-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `ClaimStore` — claim due automations, commit next runs, optimistic update
//!   - `DefinitionReader` — read condition groups, conditions, actions, targets
//!   - `LogStore` — upsert & purge execution logs
//!   - `MessageSender` / `SessionSource` / `Session` — session-partitioned broker
//!   - `ActionInvoker` — call an external action endpoint
//! - Define **driving/inbound** use-cases:
//!   - `SchedulerCycle` — claim → publish → commit, until nothing is due
//!   - `LockReconciler` — release automations stuck in LOCKED
//!   - `MessageHandler` — load snapshot, invoke actions, record the outcome
//!   - `SessionDispatcher` — bounded session × message concurrency with
//!     cooperative shutdown
//! //!
//! ## Dependency rule
//! Depends on `cadence-domain` only (plus `tokio` and `tokio-util` for
//! channels, timers and cancellation).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod dispatcher;
pub mod ports;
pub mod services;

#[cfg(test)]
mod session_queue;
#[cfg(test)]
mod testing;
