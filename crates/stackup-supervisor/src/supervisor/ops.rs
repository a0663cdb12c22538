//! Launch, exit handling, automatic restarts and stopping.

use super::types::{Execution, ProcessEntry, ProcessRecord};
use crate::config::SupervisorOptions;
use crate::lifecycle::RestartDecision;
use chrono::Utc;
use stackup_common::{ExitInfo, ProcessError, ProcessResult};
use stackup_log_collection::{LogRouter, StreamType};
use stackup_process::{force_kill, process_exists, spawn_process, terminate_gracefully};
use stackup_process_state::ProcessState;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub(super) struct SupervisorInner {
    pub options: SupervisorOptions,
    /// Launch order.
    pub entries: Vec<Arc<ProcessEntry>>,
    pub index: HashMap<String, Arc<ProcessEntry>>,
    pub log_router: Arc<LogRouter>,
    pub shutdown_token: CancellationToken,
}

impl SupervisorInner {
    pub fn entry(&self, name: &str) -> ProcessResult<Arc<ProcessEntry>> {
        self.index
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::not_found(name))
    }

    pub async fn start_entry(self: &Arc<Self>, entry: &Arc<ProcessEntry>) -> ProcessResult<()> {
        let mut record = entry.record.lock().await;
        let state = record.state_machine.current_state();
        if state.is_live() {
            debug!("Process {} is already {}, not launching", entry.name(), state);
            return Ok(());
        }

        cancel_pending_restart(entry, &mut record);
        self.launch_locked(entry, &mut record, "start requested")
    }

    /// Launch only from Stopped. Exited and FatalFailed processes were already
    /// decided on by the restart policy and stay as they are.
    pub async fn launch_stopped_entry(
        self: &Arc<Self>,
        entry: &Arc<ProcessEntry>,
    ) -> ProcessResult<bool> {
        let mut record = entry.record.lock().await;
        let state = record.state_machine.current_state();
        if state != ProcessState::Stopped {
            debug!("Process {} is {}, leaving it to its restart policy", entry.name(), state);
            return Ok(false);
        }

        self.launch_locked(entry, &mut record, "initial launch")?;
        Ok(true)
    }

    pub async fn stop_entry(&self, entry: &Arc<ProcessEntry>, reason: &str) -> ProcessResult<()> {
        let mut record = entry.record.lock().await;
        stop_locked(entry, &mut record, reason).await
    }

    pub async fn restart_entry(self: &Arc<Self>, entry: &Arc<ProcessEntry>) -> ProcessResult<()> {
        let mut record = entry.record.lock().await;
        stop_locked(entry, &mut record, "restart requested").await?;
        record.tracker.reset();
        self.launch_locked(entry, &mut record, "manual restart")
    }

    /// Spawn a new execution. The caller holds the record lock.
    fn launch_locked(
        self: &Arc<Self>,
        entry: &Arc<ProcessEntry>,
        record: &mut ProcessRecord,
        reason: &str,
    ) -> ProcessResult<()> {
        let name = entry.name();
        if self.shutdown_token.is_cancelled() {
            return Err(ProcessError::ShuttingDown {
                id: name.to_string(),
            });
        }

        record.state_machine.transition_to_starting(reason)?;

        let mut child = match spawn_process(&entry.config.spawn_request()) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch process {}: {}", name, e);
                record.state_machine.transition_to_fatal(e.to_string())?;
                record.last_error = Some(e.clone());
                entry.publish(record);
                return Err(e);
            }
        };

        let pid = child.id().unwrap_or_default();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            self.attach_reader(name, StreamType::Stdout, stdout, &mut readers);
        }
        if let Some(stderr) = child.stderr.take() {
            self.attach_reader(name, StreamType::Stderr, stderr, &mut readers);
        }

        record.generation += 1;
        let generation = record.generation;
        let (exit_tx, exit_rx) = watch::channel(None);
        record.execution = Some(Execution {
            generation,
            pid,
            exit_rx,
        });
        record.started_at = Some(Utc::now());
        record.started_instant = Some(Instant::now());
        record.last_error = None;

        let ready_after = entry.config.ready_after;
        if ready_after.is_zero() {
            record.state_machine.transition_to_running()?;
        }
        info!("Process {} launched (PID: {}, {})", name, pid, reason);
        entry.publish(record);

        tokio::spawn(monitor_execution(
            Arc::downgrade(self),
            Arc::clone(entry),
            generation,
            child,
            readers,
            exit_tx,
        ));
        Ok(())
    }

    fn attach_reader<R>(
        &self,
        name: &str,
        stream: StreamType,
        reader: R,
        readers: &mut Vec<JoinHandle<()>>,
    ) where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        match self.log_router.attach(name, stream, reader) {
            Ok(handle) => readers.push(handle),
            Err(e) => warn!("Output of {} ({}) will not be captured: {}", name, stream, e),
        }
    }

    async fn on_exit(self: &Arc<Self>, entry: &Arc<ProcessEntry>, generation: u64, exit: ExitInfo) {
        let name = entry.name();
        let mut record = entry.record.lock().await;
        if !record.is_current(generation) {
            debug!("Ignoring exit of stale execution {} of {}", generation, name);
            return;
        }

        record.execution = None;
        record.started_instant = None;
        record.last_exit = Some(exit);
        if let Err(e) = record.state_machine.transition_to_exited(exit.to_string()) {
            warn!("Process {}: {}", name, e);
        }

        if exit.is_success() {
            info!("Process {} exited ({})", name, exit);
        } else {
            warn!("Process {} exited unexpectedly ({})", name, exit);
            record.last_error = Some(ProcessError::Crashed {
                id: name.to_string(),
                exit: exit.to_string(),
            });
        }

        if self.shutdown_token.is_cancelled() {
            entry.publish(&record);
            return;
        }

        match record.tracker.on_exit(&exit) {
            RestartDecision::NotPermitted => {
                info!(
                    "Process {} will not be restarted (restart policy: {})",
                    name, entry.config.restart_policy
                );
            }
            RestartDecision::Restart { attempt, delay } => {
                warn!(
                    "Restarting process {} in {:?} (attempt {}/{})",
                    name, delay, attempt, entry.config.max_consecutive_restarts
                );
                self.schedule_restart(entry, &mut record, attempt, delay);
            }
            RestartDecision::StormDetected { restarts } => {
                let e = ProcessError::RestartStormDetected {
                    id: name.to_string(),
                    restarts,
                    window_secs: record.tracker.restart_window().as_secs(),
                };
                error!("{}; giving up until restarted manually", e);
                if let Err(transition_error) =
                    record.state_machine.transition_to_fatal(e.to_string())
                {
                    warn!("Process {}: {}", name, transition_error);
                }
                record.last_error = Some(e);
            }
        }

        entry.publish(&record);
    }

    fn schedule_restart(
        self: &Arc<Self>,
        entry: &Arc<ProcessEntry>,
        record: &mut ProcessRecord,
        attempt: u32,
        delay: Duration,
    ) {
        let token = self.shutdown_token.child_token();
        record.pending_restart = Some(token.clone());

        let supervisor = Arc::downgrade(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(delay) => {}
            }

            let Some(supervisor) = supervisor.upgrade() else {
                return;
            };
            let mut record = entry.record.lock().await;
            // stop or start may have won the race for the lock
            if token.is_cancelled() {
                return;
            }
            record.pending_restart = None;

            let reason = format!("automatic restart {}", attempt);
            if let Err(e) = supervisor.launch_locked(&entry, &mut record, &reason) {
                error!("Automatic restart of {} failed: {}", entry.name(), e);
            }
        });
    }
}

fn cancel_pending_restart(entry: &ProcessEntry, record: &mut ProcessRecord) {
    if let Some(token) = record.pending_restart.take() {
        token.cancel();
        debug!("Cancelled pending restart of {}", entry.name());
    }
}

/// Stop the current execution, if any, and move to `Stopped`.
async fn stop_locked(
    entry: &ProcessEntry,
    record: &mut ProcessRecord,
    reason: &str,
) -> ProcessResult<()> {
    cancel_pending_restart(entry, record);

    if let Some(execution) = record.execution.take() {
        match terminate_execution(entry, &execution).await {
            Ok(exit) => {
                info!("Process {} stopped ({})", entry.name(), exit);
                record.last_exit = Some(exit);
            }
            Err(e) => {
                record.execution = Some(execution);
                record.last_error = Some(e.clone());
                entry.publish(record);
                return Err(e);
            }
        }
    }

    record.started_instant = None;
    record.state_machine.transition_to_stopped(reason)?;
    entry.publish(record);
    Ok(())
}

/// SIGTERM to the process group, SIGKILL after the grace period.
async fn terminate_execution(
    entry: &ProcessEntry,
    execution: &Execution,
) -> ProcessResult<ExitInfo> {
    let name = entry.name();
    let pid = execution.pid;
    let mut exit_rx = execution.exit_rx.clone();

    let already_exited = *exit_rx.borrow();
    if let Some(exit) = already_exited {
        return Ok(exit);
    }

    let grace_period = entry.config.stop_grace_period;
    info!("Stopping {} (PID: {}), grace period {:?}", name, pid, grace_period);
    if let Err(e) = terminate_gracefully(pid) {
        warn!("Failed to send SIGTERM to {}: {}", name, e);
    }
    if let Some(exit) = wait_for_exit(name, pid, &mut exit_rx, grace_period).await? {
        return Ok(exit);
    }

    warn!(
        "Graceful shutdown timed out for {} (PID: {}), attempting force kill",
        name, pid
    );
    if let Err(e) = force_kill(pid) {
        error!("Failed to send SIGKILL to {}: {}", name, e);
    }
    if let Some(exit) = wait_for_exit(name, pid, &mut exit_rx, FORCE_KILL_TIMEOUT).await? {
        return Ok(exit);
    }

    Err(ProcessError::timeout(
        name,
        format!("stop: still running {:?} after SIGKILL", FORCE_KILL_TIMEOUT),
    ))
}

async fn wait_for_exit(
    name: &str,
    pid: u32,
    exit_rx: &mut watch::Receiver<Option<ExitInfo>>,
    limit: Duration,
) -> ProcessResult<Option<ExitInfo>> {
    match timeout(limit, exit_rx.wait_for(Option::is_some)).await {
        Ok(Ok(exit)) => Ok(*exit),
        Ok(Err(_)) => {
            // monitor is gone without reporting; ask the OS instead
            if process_exists(pid)? {
                Ok(None)
            } else {
                debug!("Process {} (PID: {}) is gone", name, pid);
                Ok(Some(ExitInfo {
                    code: None,
                    signal: None,
                }))
            }
        }
        Err(_) => Ok(None),
    }
}

/// Owns the child of one execution until it is reaped.
async fn monitor_execution(
    supervisor: Weak<SupervisorInner>,
    entry: Arc<ProcessEntry>,
    generation: u64,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    let ready_after = entry.config.ready_after;
    let status = if ready_after.is_zero() {
        child.wait().await
    } else {
        tokio::select! {
            status = child.wait() => status,
            _ = sleep(ready_after) => {
                tokio::spawn(mark_ready(Arc::clone(&entry), generation));
                child.wait().await
            }
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            error!("Failed to wait for process {}: {}", entry.name(), e);
            ExitInfo {
                code: None,
                signal: None,
            }
        }
    };
    exit_tx.send_replace(Some(exit));

    for reader in readers {
        if timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
            debug!("Output of {} still open after exit", entry.name());
        }
    }

    if let Some(supervisor) = supervisor.upgrade() {
        supervisor.on_exit(&entry, generation, exit).await;
    }
}

/// `Starting` -> `Running` once the execution survived `ready_after`.
async fn mark_ready(entry: Arc<ProcessEntry>, generation: u64) {
    let mut record = entry.record.lock().await;
    if !record.is_current(generation)
        || record.state_machine.current_state() != ProcessState::Starting
    {
        return;
    }

    match record.state_machine.transition_to_running() {
        Ok(()) => {
            info!(
                "Process {} is running (alive for {:?})",
                entry.name(),
                entry.config.ready_after
            );
            entry.publish(&record);
        }
        Err(e) => warn!("Process {}: {}", entry.name(), e),
    }
}
