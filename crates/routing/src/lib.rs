//! Route inbound messages to plugins.
//!
//! Per message:
//! 1. Edits are folded into a plain message
//! 2. Active triggers, first match in registration order, gated by RBAC
//! 3. Passive triggers, every regex match of every eligible plugin
//! 4. A fallback reply when the bot was addressed and nothing handled it

pub mod dispatcher;
pub mod error;
pub mod matching;

pub use {
    dispatcher::{DispatchOutcome, Dispatcher, DispatcherOptions},
    error::{Error, Result},
};
