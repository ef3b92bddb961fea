//! Core error types for vertex-genmedia.

use thiserror::Error;

/// gRPC status code Google uses for "internal error, try again".
pub const TRANSIENT_INTERNAL_CODE: i32 = 13;

/// The unified error type for credential resolution, polling, extraction and persistence.
#[derive(Error, Debug, Clone)]
pub enum GenMediaError {
    /// Missing or invalid credentials / configuration. User-actionable, never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A node parameter is missing or has an unusable value.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Token acquisition or refresh failed.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// A recognized transient provider error. Surfaced with retry guidance, not auto-retried.
    #[error("Transient provider error (code {code}): {message}")]
    TransientProviderError { code: i32, message: String },

    /// The provider filtered the generated media for content-safety reasons.
    #[error("Content filtered: {filtered_count} item(s) removed by the provider's safety policy")]
    ContentFilteredError {
        filtered_count: u32,
        reasons: Vec<String>,
    },

    /// An input item failed MIME or size validation.
    #[error("Unsupported media: {0}")]
    UnsupportedMediaError(String),

    /// A long-running operation finished with a non-transient error.
    #[error("Operation failed (code {code:?}): {message}")]
    OperationFailed { code: Option<i32>, message: String },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-success HTTP response from a provider endpoint.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Response could not be interpreted.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    #[error("IO error: {0}")]
    IoError(String),

    /// The host cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Polling exceeded its attempt or time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Catch-all.
    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

/// Coarse classification used for log hints and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Auth,
    Transient,
    ContentFilter,
    Media,
    Provider,
    Network,
    Cancelled,
    Unexpected,
}

impl GenMediaError {
    /// Create an API error from a status code and message.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Classify an operation error code into the taxonomy.
    pub fn from_operation_error(code: Option<i32>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(TRANSIENT_INTERNAL_CODE) => Self::TransientProviderError {
                code: TRANSIENT_INTERNAL_CODE,
                message,
            },
            _ => Self::OperationFailed { code, message },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::InvalidParameter(_) => ErrorCategory::Validation,
            Self::AuthError(_) => ErrorCategory::Auth,
            Self::TransientProviderError { .. } => ErrorCategory::Transient,
            Self::ContentFilteredError { .. } => ErrorCategory::ContentFilter,
            Self::UnsupportedMediaError(_) => ErrorCategory::Media,
            Self::OperationFailed { .. } | Self::ParseError(_) | Self::JsonError(_) => {
                ErrorCategory::Provider
            }
            Self::ApiError { code, .. } if *code == 401 || *code == 403 => ErrorCategory::Auth,
            Self::ApiError { .. } => ErrorCategory::Provider,
            Self::HttpError(_) | Self::Timeout(_) => ErrorCategory::Network,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::IoError(_) | Self::UnexpectedError(_) => ErrorCategory::Unexpected,
        }
    }

    /// HTTP status when the error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether a transport-level retry makes sense. Provider operation errors never qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) => true,
            Self::ApiError { code, .. } => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }

    /// Errors the user can fix by changing settings or inputs.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration
                | ErrorCategory::Validation
                | ErrorCategory::ContentFilter
                | ErrorCategory::Media
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_13_is_transient() {
        let e = GenMediaError::from_operation_error(Some(13), "Internal error encountered.");
        assert!(matches!(
            e,
            GenMediaError::TransientProviderError { code: 13, .. }
        ));
        assert_eq!(e.category(), ErrorCategory::Transient);
        assert!(!e.is_retryable());
    }

    #[test]
    fn other_codes_are_surfaced_raw() {
        let e = GenMediaError::from_operation_error(Some(3), "bad prompt");
        match e {
            GenMediaError::OperationFailed { code, message } => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "bad prompt");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(GenMediaError::api_error(503, "unavailable").is_retryable());
        assert!(GenMediaError::api_error(429, "slow down").is_retryable());
        assert!(!GenMediaError::api_error(400, "bad").is_retryable());
        assert_eq!(
            GenMediaError::api_error(403, "denied").category(),
            ErrorCategory::Auth
        );
    }
}
