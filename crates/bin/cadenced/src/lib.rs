//! # cadenced — cadence daemon
//!
//! Composition root that wires all adapters together and runs the loops.
//!
//! ## Responsibilities
//! - Parse configuration (CLI args, env vars, config file)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository, queue and invoker implementations (adapters)
//! - Construct application services, injecting adapters via port traits
//! - Run the scheduler tick loop and/or the session dispatcher
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

pub mod config;
pub mod runtime;
