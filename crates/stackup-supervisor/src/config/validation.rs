use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::net::SocketAddr;

/// Validate the complete supervisor configuration
pub fn validate_config(config: &SupervisorConfig) -> Result<()> {
    validate_supervisor_options(&config.supervisor)?;
    validate_process_configs(&config.processes)?;
    Ok(())
}

fn validate_supervisor_options(options: &SupervisorOptions) -> Result<()> {
    if let Some(ref control) = options.control {
        control.listen.parse::<SocketAddr>().map_err(|e| {
            anyhow!(
                "Invalid control listen address '{}': {}",
                control.listen,
                e
            )
        })?;
    }

    if let Some(ref dir) = options.log_directory {
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("log_directory cannot be empty"));
        }
    }

    Ok(())
}

/// Validate all process configurations
fn validate_process_configs(processes: &[ManagedProcessConfig]) -> Result<()> {
    let mut names = HashSet::new();
    for process in processes {
        if !names.insert(process.name.as_str()) {
            return Err(anyhow!("Duplicate process name: {}", process.name));
        }
        validate_process_config(process)?;
    }
    Ok(())
}

/// Validate a single process configuration
pub fn validate_process_config(process: &ManagedProcessConfig) -> Result<()> {
    stackup_process::validate_process_id(&process.name)?;

    if process.name.len() > 64 {
        return Err(anyhow!(
            "Process name too long (max 64 characters): {}",
            process.name
        ));
    }

    stackup_process::validate_executable(&process.name, &process.command)?;

    if process.restart_window.is_zero() {
        return Err(anyhow!(
            "Process {}: restart_window must be greater than 0",
            process.name
        ));
    }

    if !process.backoff_multiplier.is_finite() || process.backoff_multiplier < 1.0 {
        return Err(anyhow!(
            "Process {}: backoff_multiplier must be at least 1.0, got {}",
            process.name,
            process.backoff_multiplier
        ));
    }

    if process.max_restart_delay < process.restart_delay {
        return Err(anyhow!(
            "Process {}: max_restart_delay ({:?}) is shorter than restart_delay ({:?})",
            process.name,
            process.max_restart_delay,
            process.restart_delay
        ));
    }

    if let Some(ref wd) = process.working_directory {
        if wd.as_os_str().is_empty() {
            return Err(anyhow!(
                "Process {}: working_directory cannot be empty",
                process.name
            ));
        }
    }

    Ok(())
}
