//! Type Conversions for GenMediaError
//!
//! This module contains From trait implementations for converting
//! common error types into GenMediaError.

use super::types::GenMediaError;

impl From<reqwest::Error> for GenMediaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GenMediaError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for GenMediaError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
