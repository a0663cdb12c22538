//! # stackup-monitoring
//!
//! Health checking for dependency-gated startup.
//!
//! This crate provides:
//! - Health check specifications and target descriptors (HTTP, TCP, command, process)
//! - [`HealthProbe`]: one bounded attempt against every target of a spec
//! - [`BoundedPoll`]: the retry cadence around a probe (attempt count, interval, cancellation)

pub mod command;
pub mod http;
pub mod poll;
pub mod probe;
pub mod spec;
pub mod tcp;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Health check error types.
///
/// These describe why a target could not be evaluated at all. Probes report them
/// as [`HealthOutcome::Error`], distinct from a target that answered "not ready".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthCheckError {
    #[error("Health check timeout: {target} after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Health check connection failed: {target} - {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("Health check invalid target: {target} - {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Health check command failed to run: {target} - {reason}")]
    CommandFailed { target: String, reason: String },

    #[error("Invalid health check: {reason}")]
    InvalidSpec { reason: String },
}

/// Result type for health check operations.
pub type HealthCheckResult<T> = Result<T, HealthCheckError>;

/// Outcome of probing one target once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthOutcome {
    Healthy,
    /// The target answered but did not meet its success criterion.
    Unhealthy(String),
    /// The target could not be evaluated (unreachable, timed out, unknown).
    Error(String),
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

impl From<HealthCheckError> for HealthOutcome {
    fn from(error: HealthCheckError) -> Self {
        HealthOutcome::Error(error.to_string())
    }
}

impl fmt::Display for HealthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthOutcome::Healthy => write!(f, "healthy"),
            HealthOutcome::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
            HealthOutcome::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Outcome of one target within a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub outcome: HealthOutcome,
    pub response_time_ms: u64,
}

/// Result of one probe attempt across all targets of a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub checked_at: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
}

impl ProbeReport {
    pub fn new(targets: Vec<TargetReport>) -> Self {
        Self {
            checked_at: Utc::now(),
            targets,
        }
    }

    /// Healthy only when every target is healthy.
    pub fn is_healthy(&self) -> bool {
        self.targets.iter().all(|t| t.outcome.is_healthy())
    }

    /// One line per target, e.g. `tcp 127.0.0.1:6379: error: connection refused`.
    pub fn summary(&self) -> String {
        self.targets
            .iter()
            .map(|t| format!("{}: {}", t.target, t.outcome))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// Re-export main types
pub use poll::{BoundedPoll, PollControl, PollOutcome};
pub use probe::{DefaultHealthProbe, HealthProbe, ProcessLiveness};
pub use spec::{HealthCheckSpec, HealthTarget};

#[cfg(test)]
mod tests {
    use super::*;

    fn target(outcome: HealthOutcome) -> TargetReport {
        TargetReport {
            target: "tcp cache:6379".to_string(),
            outcome,
            response_time_ms: 1,
        }
    }

    #[test]
    fn test_report_requires_every_target_healthy() {
        let report = ProbeReport::new(vec![
            target(HealthOutcome::Healthy),
            target(HealthOutcome::Unhealthy("503".to_string())),
        ]);
        assert!(!report.is_healthy());

        let report = ProbeReport::new(vec![target(HealthOutcome::Healthy)]);
        assert!(report.is_healthy());
    }

    #[test]
    fn test_error_is_distinct_from_unhealthy() {
        let error: HealthOutcome = HealthCheckError::ConnectionFailed {
            target: "tcp cache:6379".to_string(),
            reason: "connection refused".to_string(),
        }
        .into();
        assert!(matches!(error, HealthOutcome::Error(_)));
        assert!(!error.is_healthy());
        assert!(error.to_string().starts_with("error: "));
    }
}
