//! Telemetry and tracing utilities
//!
//! Helpers for installing a `tracing-subscriber` when the host has not installed one.
//!
//! ```rust,ignore
//! use vertex_genmedia::telemetry::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! init_subscriber(SubscriberConfig::builder().output_format(OutputFormat::Json).build())?;
//! ```

use crate::error::{GenMediaError, Result};

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonCompact,
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            output_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from a string
    pub fn log_level_str(mut self, level: &str) -> Result<Self> {
        let level = parse_level(level).ok_or_else(|| {
            GenMediaError::ConfigurationError(format!(
                "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
            ))
        })?;
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
        }
    }
}

fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn parse_format(format: &str) -> Option<OutputFormat> {
    match format.to_lowercase().as_str() {
        "text" => Some(OutputFormat::Text),
        "json" => Some(OutputFormat::Json),
        "json-compact" => Some(OutputFormat::JsonCompact),
        _ => None,
    }
}

/// Install a global fmt subscriber. An already-installed subscriber is not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<()> {
    let level = config.log_level.to_string().to_lowercase();
    let filter = format!("vertex_genmedia={level}");

    let init_result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .flatten_event(true)
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(()),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(GenMediaError::ConfigurationError(format!(
                    "Failed to initialize tracing: {msg}"
                )))
            }
        }
    }
}

/// Initialize from `GENMEDIA_LOG_LEVEL` and `GENMEDIA_LOG_FORMAT`.
pub fn init_from_env() -> Result<()> {
    let mut builder = SubscriberConfig::builder();
    if let Ok(level) = std::env::var("GENMEDIA_LOG_LEVEL") {
        builder = builder.log_level_str(&level)?;
    }
    if let Ok(format) = std::env::var("GENMEDIA_LOG_FORMAT") {
        let output_format = parse_format(&format).ok_or_else(|| {
            GenMediaError::ConfigurationError(format!(
                "Invalid log format: {format}. Valid options: text, json, json-compact"
            ))
        })?;
        builder = builder.output_format(output_format);
    }
    init_subscriber(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_parse() {
        let cfg = SubscriberConfig::builder()
            .log_level_str("DEBUG")
            .unwrap()
            .build();
        assert_eq!(cfg.log_level, tracing::Level::DEBUG);
        assert!(SubscriberConfig::builder().log_level_str("loud").is_err());
        assert_eq!(parse_format("json-compact"), Some(OutputFormat::JsonCompact));
    }
}
