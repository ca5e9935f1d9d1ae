//! # cadence-domain
//!
//! Pure domain model for the cadence automation scheduler.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Automations** (recurring schedule definitions and their claim status)
//! - Define the **Recurrence** rules that derive the next execution instant
//! - Define the read-only **definitions** fetched for an execution
//!   (condition groups, conditions, actions, targets)
//! - Define **Snapshots** (the aggregate forwarded to action endpoints)
//! - Define **Execution logs** and their time-sortable identifiers
//! - Define the **Trigger message** exchanged between scheduler and worker
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod definition;
pub mod execution;
pub mod message;
pub mod recurrence;
pub mod snapshot;
