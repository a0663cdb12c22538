//! Error types for stackup.
//!
//! Library crates return [`ProcessResult`] for anything that touches a managed
//! process. The variants follow the supervision taxonomy: launch errors are
//! fatal for the process, crashes are recoverable under the restart policy, and
//! a restart storm escalates the process to a state that is never retried
//! automatically.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailureKind {
    /// The executable could not be found.
    ExecutableNotFound,
    /// The executable exists but could not be executed.
    PermissionDenied,
    /// Any other spawn error reported by the operating system.
    Other,
}

impl LaunchFailureKind {
    /// Classifies an I/O error returned by a spawn attempt.
    pub fn from_io(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => LaunchFailureKind::ExecutableNotFound,
            std::io::ErrorKind::PermissionDenied => LaunchFailureKind::PermissionDenied,
            _ => LaunchFailureKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchFailureKind::ExecutableNotFound => "executable not found",
            LaunchFailureKind::PermissionDenied => "permission denied",
            LaunchFailureKind::Other => "spawn error",
        }
    }
}

impl fmt::Display for LaunchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-specific error types for supervision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("Process not found: {id}")]
    NotFound { id: String },

    #[error("Process launch failed: {id} - {kind}: {reason}")]
    LaunchFailed {
        id: String,
        kind: LaunchFailureKind,
        reason: String,
    },

    #[error("Process crashed: {id} - {exit}")]
    Crashed { id: String, exit: String },

    #[error("Restart storm detected: {id} - {restarts} restarts within {window_secs}s")]
    RestartStormDetected {
        id: String,
        restarts: u32,
        window_secs: u64,
    },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Process state error: {id} - cannot move from {actual} to {expected}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Process logging error: {id} - {reason}")]
    LoggingError { id: String, reason: String },

    #[error("Supervisor is shutting down, refusing to launch {id}")]
    ShuttingDown { id: String },

    #[error("Some processes failed to launch: {}", failed.join(", "))]
    BatchFailed { failed: Vec<String> },
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn launch_failed(
        id: impl Into<String>,
        kind: LaunchFailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self::LaunchFailed {
            id: id.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn logging(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoggingError {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that make the process unusable until an operator acts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProcessError::LaunchFailed { .. } | ProcessError::RestartStormDetected { .. }
        )
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_construction() {
        let error = ProcessError::not_found("cache");
        assert!(matches!(error, ProcessError::NotFound { .. }));
        assert_eq!(format!("{}", error), "Process not found: cache");

        let error = ProcessError::launch_failed(
            "api",
            LaunchFailureKind::ExecutableNotFound,
            "No such file or directory",
        );
        assert!(error.is_fatal());
        assert!(format!("{}", error).contains("executable not found"));
    }

    #[test]
    fn test_launch_failure_classification() {
        assert_eq!(
            LaunchFailureKind::from_io(std::io::ErrorKind::NotFound),
            LaunchFailureKind::ExecutableNotFound
        );
        assert_eq!(
            LaunchFailureKind::from_io(std::io::ErrorKind::PermissionDenied),
            LaunchFailureKind::PermissionDenied
        );
        assert_eq!(
            LaunchFailureKind::from_io(std::io::ErrorKind::AddrInUse),
            LaunchFailureKind::Other
        );
    }

    #[test]
    fn test_batch_failed_lists_processes() {
        let error = ProcessError::BatchFailed {
            failed: vec!["cache".to_string(), "worker".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Some processes failed to launch: cache, worker"
        );
        assert!(!error.is_fatal());
    }
}
