//! Process execution primitives.
//!
//! Children are spawned with piped stdout/stderr, a null stdin and, on Unix,
//! in a fresh process group whose id equals the child's pid. Termination
//! signals are sent to the whole group so that wrapper shells do not leave
//! orphans behind.

use stackup_common::{LaunchFailureKind, ProcessError, ProcessResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Everything needed to spawn one execution of a process.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Process name, used for error reporting only.
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

impl SpawnRequest {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Spawn the requested process.
///
/// Spawn errors are classified into [`LaunchFailureKind`] and returned as
/// [`ProcessError::LaunchFailed`].
pub fn spawn_process(request: &SpawnRequest) -> ProcessResult<Child> {
    let mut cmd = Command::new(&request.command);
    cmd.args(&request.args);

    if let Some(ref wd) = request.working_directory {
        cmd.current_dir(wd);
    }

    for (key, value) in &request.environment {
        cmd.env(key, value);
    }

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| {
        ProcessError::launch_failed(
            request.id.clone(),
            LaunchFailureKind::from_io(e.kind()),
            format!("{}: {}", request.command, e),
        )
    })?;

    debug!(
        "Spawned {} (command: {}, PID: {:?})",
        request.id,
        request.command,
        child.id()
    );
    Ok(child)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let request = SpawnRequest::new("echo", "sh").args(["-c", "exit 3"]);
        let mut child = spawn_process(&request).unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_executable_is_classified() {
        let request = SpawnRequest::new("ghost", "/nonexistent/definitely-not-here");
        let err = spawn_process(&request).unwrap_err();
        match err {
            ProcessError::LaunchFailed { id, kind, .. } => {
                assert_eq!(id, "ghost");
                assert_eq!(kind, LaunchFailureKind::ExecutableNotFound);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_environment_and_working_directory() {
        let mut request = SpawnRequest::new("env", "sh").args([
            "-c",
            "test \"$STACKUP_TEST\" = yes && test \"$(pwd)\" = /",
        ]);
        request.environment.insert("STACKUP_TEST".into(), "yes".into());
        request.working_directory = Some(PathBuf::from("/"));

        let mut child = spawn_process(&request).unwrap();
        assert!(child.wait().await.unwrap().success());
    }
}
