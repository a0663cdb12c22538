//! Starting collaborators that live outside the supervisor.

use crate::config::ExternalService;
use crate::error::{OrchestrationError, OrchestrationResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// Starts one external service. Called at most once per service per bring-up.
#[async_trait]
pub trait ExternalLauncher: Send + Sync {
    async fn launch(&self, service: &ExternalService) -> OrchestrationResult<()>;
}

/// Runs the service's `start_command` and expects it to exit with status 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

#[async_trait]
impl ExternalLauncher for CommandLauncher {
    async fn launch(&self, service: &ExternalService) -> OrchestrationResult<()> {
        let Some((program, args)) = service
            .start_command
            .as_deref()
            .and_then(|argv| argv.split_first())
        else {
            debug!(
                "External service {} has no start command, assuming it is managed elsewhere",
                service.name
            );
            return Ok(());
        };

        info!("Starting external service {}: {} {:?}", service.name, program, args);
        let run = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(service.start_timeout, run)
            .await
            .map_err(|_| OrchestrationError::ExternalLaunchTimeout {
                service: service.name.clone(),
                timeout_secs: service.start_timeout.as_secs(),
            })?
            .map_err(|e| OrchestrationError::ExternalLaunchFailed {
                service: service.name.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => format!("start command exited with {}", output.status),
            detail => format!("start command exited with {}: {}", output.status, detail),
        };
        Err(OrchestrationError::ExternalLaunchFailed {
            service: service.name.clone(),
            reason,
        })
    }
}
