//! Command health check: healthy when the command exits with status 0.

use crate::{HealthCheckError, HealthCheckResult, HealthOutcome};
use std::process::Stdio;
use tokio::process::Command;

pub async fn check_command(command: &str, args: &[String]) -> HealthCheckResult<HealthOutcome> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| HealthCheckError::CommandFailed {
            target: format!("command {}", command),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(HealthOutcome::Healthy);
    }

    let exit = stackup_common::ExitInfo::from(output.status);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = match stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => format!("{}: {}", exit, line),
        None => exit.to_string(),
    };
    Ok(HealthOutcome::Unhealthy(reason))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_status_decides_health() {
        assert_eq!(check_command("true", &[]).await.unwrap(), HealthOutcome::Healthy);

        let args = vec!["-c".to_string(), "echo 'not ready' >&2; exit 3".to_string()];
        assert_eq!(
            check_command("sh", &args).await.unwrap(),
            HealthOutcome::Unhealthy("exit code 3: not ready".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_command_is_an_error() {
        let result = check_command("/nonexistent/probe", &[]).await;
        assert!(matches!(result, Err(HealthCheckError::CommandFailed { .. })));
    }
}
