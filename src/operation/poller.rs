//! Operation poller.
//!
//! `SUBMITTED -> POLLING -> {DONE | FAILED | FILTERED}`. Each tick sleeps `interval`
//! (racing the cancel handle), then polls. Attempt and time budgets are optional;
//! exceeding one yields `GenMediaError::Timeout`.

use super::{ContentFilter, Operation, OperationError};
use crate::adapters::RawResult;
use crate::config::{DEFAULT_POLL_INTERVAL, PollConfig};
use crate::error::GenMediaError;
use crate::logs::LogSink;
use crate::utils::CancelHandle;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub const HEARTBEAT_LINE: &str = "⏳ Still generating...";

/// Terminal state of a polled operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Done(RawResult),
    Failed(OperationError),
    Filtered(ContentFilter),
}

impl PollOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
            Self::Filtered(_) => "filtered",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub operation_name: String,
    pub outcome: PollOutcome,
    /// Polls that came back not done.
    pub heartbeats: u32,
    /// Calls to the poll function (the submit call is not counted).
    pub polls: u32,
}

impl PollReport {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, PollOutcome::Done(_))
    }

    /// The raw result, or the classified terminal error.
    pub fn into_result(self) -> Result<RawResult, GenMediaError> {
        match self.outcome {
            PollOutcome::Done(raw) => Ok(raw),
            PollOutcome::Failed(err) => Err(err.into_error()),
            PollOutcome::Filtered(filter) => Err(filter.into_error()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationPoller {
    interval: Duration,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
    cancel: CancelHandle,
}

impl Default for OperationPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl OperationPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
            cancel: CancelHandle::new(),
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: config.interval,
            max_attempts: config.max_attempts,
            timeout: config.timeout,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Submit, then poll until the operation is done.
    pub async fn run<S, SFut, P, PFut>(
        &self,
        submit: S,
        mut poll: P,
        log: &dyn LogSink,
    ) -> Result<PollReport, GenMediaError>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<Operation, GenMediaError>>,
        P: FnMut(Operation) -> PFut,
        PFut: Future<Output = Result<Operation, GenMediaError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(GenMediaError::Cancelled);
        }
        let started = Instant::now();
        let mut op = submit().await?;
        let name = op.name.clone();
        if !op.done {
            log.info("⏳ Operation started! Waiting for completion...");
        }
        tracing::debug!(operation = %name, done = op.done, "operation submitted");

        let mut polls = 0u32;
        let mut heartbeats = 0u32;
        while !op.done {
            if let Some(max) = self.max_attempts
                && polls >= max
            {
                return Err(GenMediaError::Timeout(format!(
                    "operation {name} still running after {polls} polls"
                )));
            }
            let mut wait = self.interval;
            if let Some(limit) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(GenMediaError::Timeout(format!(
                        "operation {name} still running after {}s",
                        elapsed.as_secs()
                    )));
                }
                wait = wait.min(limit - elapsed);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(operation = %name, polls, "poll cancelled");
                    return Err(GenMediaError::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            op = poll(op).await?;
            polls += 1;
            if !op.done {
                heartbeats += 1;
                log.info(HEARTBEAT_LINE);
            }
        }

        log.info("✅ Generation completed!");
        let outcome = Self::evaluate(op);
        tracing::debug!(
            operation = %name,
            polls,
            heartbeats,
            outcome = outcome.label(),
            "operation finished"
        );
        Ok(PollReport {
            operation_name: name,
            outcome,
            heartbeats,
            polls,
        })
    }

    /// Classify a finished operation. An error wins over a filter report.
    fn evaluate(op: Operation) -> PollOutcome {
        if let Some(err) = op.error {
            return PollOutcome::Failed(err);
        }
        match op.response {
            Some(raw) => match raw.content_filter() {
                Some(filter) => PollOutcome::Filtered(filter),
                None => PollOutcome::Done(raw),
            },
            None => PollOutcome::Failed(OperationError::new(
                None,
                "operation completed without a response",
            )),
        }
    }
}
