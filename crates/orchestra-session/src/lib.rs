//! Orchestra Session: chain progress across pipeline invocations
//!
//! - [`ChainSession`]: state machine over a [`SessionContext`](orchestra_core::SessionContext)
//!   with gate retry tracking
//! - [`SessionStore`]: persistence with optimistic version checks
//! - [`format_reminder`]: chain status text for the model

pub mod chain;
pub mod reminder;
pub mod store;

pub use chain::{ChainSession, SessionTransition};
pub use reminder::{format_reminder, ReminderMode, CONTINUE_TOOL};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
