//! User-facing rendering of errors as node log lines.
//!
//! The node log is the only UI surface the host gives us, so every failure is turned
//! into a short classification line followed by actionable advice.

use super::types::{ErrorCategory, GenMediaError, TRANSIENT_INTERNAL_CODE};
use crate::secrets::keys;

/// Render the log lines a node writes when a whole request fails.
pub fn log_lines(err: &GenMediaError) -> Vec<String> {
    let mut lines = Vec::new();
    match err {
        GenMediaError::ConfigurationError(msg) => {
            lines.push(format!("❌ CONFIGURATION ERROR: {msg}"));
            lines.push("💡 Please set up Google Cloud credentials in the library settings:".into());
            lines.extend(credential_alternatives());
        }
        GenMediaError::InvalidParameter(msg) => {
            lines.push(format!("❌ INVALID PARAMETER: {msg}"));
            lines.push("💡 Check the node's parameters and run it again.".into());
        }
        GenMediaError::TransientProviderError { code, message } => {
            lines.push(format!("❌ Generation failed with error (code {code}): {message}"));
            if *code == TRANSIENT_INTERNAL_CODE {
                lines.push(
                    "🔄 This is a temporary Google API internal error. Please try again in a few minutes."
                        .into(),
                );
                lines.push(
                    "💡 Tip: You can also try a different region (e.g., 'us-east1').".into(),
                );
            }
        }
        GenMediaError::ContentFilteredError {
            filtered_count,
            reasons,
        } => {
            lines.push(format!(
                "🚫 Content Filter: {filtered_count} item(s) were filtered by Google's content policy."
            ));
            for reason in reasons {
                lines.push(format!("   Reason: {reason}"));
            }
            lines.push(
                "💡 Tip: Try rephrasing your prompt to avoid violent, sexual, or harmful content."
                    .into(),
            );
        }
        GenMediaError::Cancelled => lines.push("⏹️ Generation cancelled.".into()),
        other => match other.category() {
            ErrorCategory::Auth => {
                lines.push(format!("❌ AUTHENTICATION ERROR: {other}"));
                lines.push("💡 Check that the configured identity can access Vertex AI.".into());
            }
            _ => lines.push(format!("❌ An unexpected error occurred: {other}")),
        },
    }
    lines
}

/// The four configuration alternatives, in resolution order.
pub fn credential_alternatives() -> Vec<String> {
    vec![
        format!(
            "   - {} (recommended, path to workload identity config)",
            keys::WORKLOAD_IDENTITY_CONFIG_PATH
        ),
        format!(
            "   - OR {} (path to service account JSON)",
            keys::SERVICE_ACCOUNT_FILE_PATH
        ),
        format!(
            "   - OR {} + {}",
            keys::PROJECT_ID,
            keys::CREDENTIALS_JSON
        ),
        format!(
            "   - OR {} alone (Application Default Credentials, e.g. gcloud auth)",
            keys::PROJECT_ID
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_all_alternatives() {
        let lines = log_lines(&GenMediaError::ConfigurationError("nothing set".into()));
        assert!(lines[0].contains("CONFIGURATION ERROR"));
        assert_eq!(lines.len(), 2 + 4);
        assert!(lines.iter().any(|l| l.contains(keys::WORKLOAD_IDENTITY_CONFIG_PATH)));
    }

    #[test]
    fn parameter_errors_carry_no_credential_advice() {
        let lines = log_lines(&GenMediaError::InvalidParameter(
            "Parameter 'prompt' is required".into(),
        ));
        assert_eq!(lines[0], "❌ INVALID PARAMETER: Parameter 'prompt' is required");
        assert!(!lines.iter().any(|l| l.contains("credentials")));
        for alt in credential_alternatives() {
            assert!(!lines.contains(&alt));
        }
    }

    #[test]
    fn filter_reasons_are_verbatim() {
        let lines = log_lines(&GenMediaError::ContentFilteredError {
            filtered_count: 2,
            reasons: vec!["reason A".into(), "reason B".into()],
        });
        assert!(lines.contains(&"   Reason: reason A".to_string()));
        assert!(lines.contains(&"   Reason: reason B".to_string()));
    }

    #[test]
    fn transient_error_suggests_region() {
        let lines = log_lines(&GenMediaError::from_operation_error(Some(13), "internal"));
        assert!(lines.iter().any(|l| l.contains("different region")));
    }
}
