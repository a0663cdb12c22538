//! Process termination primitives.
//!
//! Both functions signal the process group led by `pid`. A group that is
//! already gone is not an error.

use stackup_common::{ProcessError, ProcessResult};

/// Ask the process group to terminate (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::stop_failed(
            pid.to_string(),
            "graceful termination is only supported on unix",
        ))
    }
}

/// Force kill the process group (SIGKILL).
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::stop_failed(
            pid.to_string(),
            "force kill is only supported on unix",
        ))
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> ProcessResult<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            tracing::debug!("Process group {} already gone ({})", pid, signal);
            Ok(())
        }
        Err(e) => Err(ProcessError::stop_failed(
            pid.to_string(),
            format!("{} failed: {}", signal, e),
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{spawn_process, SpawnRequest};

    #[tokio::test]
    async fn test_terminate_gracefully_stops_group() {
        let request = SpawnRequest::new("sleeper", "sh").args(["-c", "sleep 30"]);
        let mut child = spawn_process(&request).unwrap();
        let pid = child.id().unwrap();

        terminate_gracefully(pid).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_force_kill_reports_signal() {
        use std::os::unix::process::ExitStatusExt;

        let request = SpawnRequest::new("trap", "sh").args(["-c", "trap '' TERM; sleep 30"]);
        let mut child = spawn_process(&request).unwrap();
        let pid = child.id().unwrap();

        force_kill(pid).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[test]
    fn test_signalling_missing_group_is_ok() {
        assert!(terminate_gracefully(9_999_999).is_ok());
    }
}
