//! Retry module
//! - policy.rs: exponential backoff retries for idempotent transport calls

pub mod policy;

pub use policy::*;
