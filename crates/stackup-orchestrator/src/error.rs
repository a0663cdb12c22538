use stackup_common::ProcessError;
use thiserror::Error;

/// Errors raised while launching the members of a group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    #[error("Unknown member '{member}' in group '{group}'")]
    UnknownMember { group: String, member: String },

    #[error("External service {service} failed to start: {reason}")]
    ExternalLaunchFailed { service: String, reason: String },

    #[error("External service {service} did not start within {timeout_secs}s")]
    ExternalLaunchTimeout { service: String, timeout_secs: u64 },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
