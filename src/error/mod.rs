//! Error Handling Module
//!
//! - Core error type (`GenMediaError`, `ErrorCategory`)
//! - Log-line rendering for node output
//! - Type conversions from common error types

mod conversions;
pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GenMediaError>;

impl GenMediaError {
    /// Human-readable lines for the node log.
    pub fn log_lines(&self) -> Vec<String> {
        helpers::log_lines(self)
    }
}
