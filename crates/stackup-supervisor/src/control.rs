//! Operator commands scoped to one managed process.

use crate::supervisor::{ProcessStatus, ProcessSupervisor};
use serde::{Deserialize, Serialize};
use stackup_common::ProcessResult;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Status,
    Start,
    Stop,
    Restart,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Status => "status",
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Restart => "restart",
        }
    }

    /// Whether the command can change process state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, ControlCommand::Status)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(ControlCommand::Status),
            "start" => Ok(ControlCommand::Start),
            "stop" => Ok(ControlCommand::Stop),
            "restart" => Ok(ControlCommand::Restart),
            other => Err(format!(
                "unknown command '{}', expected status, start, stop or restart",
                other
            )),
        }
    }
}

/// Runs [`ControlCommand`]s against a supervisor.
///
/// `start` on a live process and `stop` on a stopped one are no-ops; `restart`
/// always stops, resets the restart counter and starts again. Every command
/// answers with the status after it completed.
#[derive(Debug, Clone)]
pub struct ControlInterface {
    supervisor: ProcessSupervisor,
}

impl ControlInterface {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub async fn execute(
        &self,
        command: ControlCommand,
        name: &str,
    ) -> ProcessResult<ProcessStatus> {
        if command.is_mutating() {
            info!("Control command: {} {}", command, name);
        }

        match command {
            ControlCommand::Status => self.supervisor.status(name),
            ControlCommand::Start => self.supervisor.start_process(name).await,
            ControlCommand::Stop => self.supervisor.stop(name).await,
            ControlCommand::Restart => self.supervisor.restart(name).await,
        }
    }

    pub fn status_all(&self) -> Vec<ProcessStatus> {
        self.supervisor.status_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagedProcessConfig;
    use stackup_common::ProcessError;
    use stackup_process_state::ProcessState;

    #[test]
    fn test_parse_commands() {
        assert_eq!("status".parse::<ControlCommand>().unwrap(), ControlCommand::Status);
        assert_eq!(" Restart ".parse::<ControlCommand>().unwrap(), ControlCommand::Restart);
        assert!("reload".parse::<ControlCommand>().is_err());
        assert_eq!(ControlCommand::Stop.to_string(), "stop");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_return_post_command_state() {
        let supervisor = ProcessSupervisor::with_processes(vec![
            ManagedProcessConfig::new("worker", "sleep").with_args(["30"]),
        ])
        .unwrap();
        let control = ControlInterface::new(supervisor.clone());

        let status = control.execute(ControlCommand::Status, "worker").await.unwrap();
        assert_eq!(status.state, ProcessState::Stopped);

        let started = control.execute(ControlCommand::Start, "worker").await.unwrap();
        assert_eq!(started.state, ProcessState::Running);

        // no-op on a running process
        let again = control.execute(ControlCommand::Start, "worker").await.unwrap();
        assert_eq!(again.pid, started.pid);

        let restarted = control.execute(ControlCommand::Restart, "worker").await.unwrap();
        assert_eq!(restarted.state, ProcessState::Running);
        assert_ne!(restarted.pid, started.pid);
        assert_eq!(restarted.restart_count, 0);

        let stopped = control.execute(ControlCommand::Stop, "worker").await.unwrap();
        assert_eq!(stopped.state, ProcessState::Stopped);
        let stopped = control.execute(ControlCommand::Stop, "worker").await.unwrap();
        assert_eq!(stopped.state, ProcessState::Stopped);

        supervisor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_process() {
        let control = ControlInterface::new(ProcessSupervisor::with_processes(Vec::new()).unwrap());
        assert!(matches!(
            control.execute(ControlCommand::Status, "ghost").await,
            Err(ProcessError::NotFound { .. })
        ));
    }
}
