//! Process existence checking.

use stackup_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports whether
/// the process exists.
///
/// * `Ok(true)` - process exists (possibly owned by another user)
/// * `Ok(false)` - no such process
/// * `Err(_)` - the check itself failed
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(nix::errno::Errno::EPERM) => Ok(true),
            Err(e) => Err(ProcessError::configuration(
                pid.to_string(),
                format!("Failed to check process: {}", e),
            )),
        }
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::configuration(
            pid.to_string(),
            "process existence checks are only supported on unix",
        ))
    }
}
