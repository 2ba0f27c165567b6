//! Shared types, error definitions, and utilities used across all hal crates.

pub mod error;
pub mod types;

pub use error::{Error, FromMessage, Result};
