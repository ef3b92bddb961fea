//! Long-running operations.
//!
//! An `Operation` is created by submitting a request and replaced by each poll until it
//! reports `done`. `poller::OperationPoller` drives that loop.

use crate::adapters::{Provider, RawResult};
use crate::error::GenMediaError;
use serde::Deserialize;
use serde_json::Value;

pub mod poller;

pub use poller::{OperationPoller, PollOutcome, PollReport};

/// Error detail reported by a finished operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl OperationError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Classify into the crate error taxonomy (code 13 is transient).
    pub fn into_error(self) -> GenMediaError {
        GenMediaError::from_operation_error(self.code, self.message)
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Content-safety filtering reported by a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub filtered_count: u32,
    pub reasons: Vec<String>,
}

impl ContentFilter {
    pub fn into_error(self) -> GenMediaError {
        GenMediaError::ContentFilteredError {
            filtered_count: self.filtered_count,
            reasons: self.reasons,
        }
    }
}

/// A server-side asynchronous job.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub error: Option<OperationError>,
    pub response: Option<RawResult>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            error: None,
            response: None,
        }
    }

    pub fn succeeded(name: impl Into<String>, response: RawResult) -> Self {
        Self {
            name: name.into(),
            done: true,
            error: None,
            response: Some(response),
        }
    }

    pub fn failed(name: impl Into<String>, error: OperationError) -> Self {
        Self {
            name: name.into(),
            done: true,
            error: Some(error),
            response: None,
        }
    }

    /// Parse a long-running operation resource
    /// (`{"name", "done", "error": {...}, "response": {...}}`).
    pub fn from_json(provider: Provider, value: &Value) -> Result<Self, GenMediaError> {
        #[derive(Deserialize)]
        struct Wire {
            name: String,
            #[serde(default)]
            done: bool,
            #[serde(default)]
            error: Option<OperationError>,
            #[serde(default)]
            response: Option<Value>,
        }
        let wire: Wire = serde_json::from_value(value.clone())
            .map_err(|e| GenMediaError::ParseError(format!("Invalid operation resource: {e}")))?;
        Ok(Self {
            name: wire.name,
            done: wire.done,
            error: wire.error,
            response: wire.response.map(|body| RawResult::new(provider, body)),
        })
    }
}
