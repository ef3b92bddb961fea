//! Node log sink.
//!
//! The host shows a node's progress as a multi-line log string. `NodeLog` collects those
//! lines and mirrors each one to `tracing` so the same events reach structured logs.

use std::sync::{Arc, Mutex};

/// Destination for user-facing progress lines.
pub trait LogSink: Send + Sync {
    fn info(&self, line: &str);
    fn warn(&self, line: &str);
}

/// Shared, clonable log buffer.
#[derive(Clone, Default)]
pub struct NodeLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl NodeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: &str) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(line.to_string());
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// The log as the host displays it: one line per entry, newline-terminated.
    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|mut l| {
                l.push('\n');
                l
            })
            .collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.clear();
        }
    }
}

impl LogSink for NodeLog {
    fn info(&self, line: &str) {
        tracing::info!(target: "vertex_genmedia::node", "{line}");
        self.push(line);
    }

    fn warn(&self, line: &str) {
        tracing::warn!(target: "vertex_genmedia::node", "{line}");
        self.push(line);
    }
}

/// Sink that only forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn info(&self, line: &str) {
        tracing::info!("{line}");
    }

    fn warn(&self, line: &str) {
        tracing::warn!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_newline_terminated() {
        let log = NodeLog::new();
        log.info("one");
        log.warn("two");
        assert_eq!(log.text(), "one\ntwo\n");
        assert_eq!(log.count_containing("t"), 1);
        log.clear();
        assert!(log.lines().is_empty());
    }

    #[test]
    #[tracing_test::traced_test]
    fn lines_are_mirrored_to_tracing() {
        NodeLog::new().warn("⚠️ quota almost exhausted");
        assert!(logs_contain("quota almost exhausted"));
    }
}
