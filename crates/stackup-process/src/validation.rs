//! Process validation utilities.

use stackup_common::{ProcessError, ProcessResult};

/// Validate that a command is usable as an executable name.
///
/// Existence is not checked here: a missing executable is a launch failure
/// reported when the process is started.
pub fn validate_executable(id: &str, command: &str) -> ProcessResult<()> {
    if command.trim().is_empty() {
        return Err(ProcessError::configuration(
            id,
            "Command cannot be empty",
        ));
    }

    if command.contains('\0') {
        return Err(ProcessError::configuration(
            id,
            "Command cannot contain NUL bytes",
        ));
    }

    Ok(())
}

/// Validate a process or group name.
pub fn validate_process_id(id: &str) -> ProcessResult<()> {
    if id.is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Process name cannot be empty",
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ProcessError::configuration(
            id,
            "Process name can only contain alphanumeric characters, '.', '-' and '_'",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_process_id() {
        assert!(validate_process_id("cache").is_ok());
        assert!(validate_process_id("api-v2_main.1").is_ok());
        assert!(validate_process_id("").is_err());
        assert!(validate_process_id("has space").is_err());
        assert!(validate_process_id("../etc").is_err());
    }

    #[test]
    fn test_validate_executable() {
        assert!(validate_executable("api", "/usr/bin/env").is_ok());
        assert!(validate_executable("api", "  ").is_err());
    }
}
