//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod claim_store;
pub mod definitions;
pub mod dispatch;
pub mod invoker;
pub mod log_store;

pub use claim_store::{ClaimStore, ClaimWindow};
pub use definitions::DefinitionReader;
pub use dispatch::{MessageSender, ReceivedMessage, Session, SessionSource};
pub use invoker::ActionInvoker;
pub use log_store::LogStore;
