//! Process supervisor: keeps a fixed set of processes alive.
//!
//! ## Concurrency
//!
//! Every managed process has its own record behind an async mutex. Operations
//! on one process (start, stop, restart, exit handling, scheduled restarts)
//! serialize on that mutex, while operations on different processes run
//! independently. After every change the record is published to a snapshot,
//! so `status` never waits for a slow stop in progress.
//!
//! ## Exit monitoring
//!
//! Each launch spawns a monitor task that owns the child. It reaps the child,
//! publishes the exit on a watch channel (what `stop` waits on), lets the
//! output readers drain and then reports the exit to the supervisor. Reports
//! are tagged with the launch generation; a report for an execution that is no
//! longer current is ignored.

mod ops;
mod types;


pub use types::ProcessStatus;

use crate::config::{ManagedProcessConfig, SupervisorConfig, SupervisorOptions};
use futures::future::join_all;
use ops::SupervisorInner;
use stackup_common::{ProcessError, ProcessResult};
use stackup_log_collection::{LogEntry, LogRouter};
use stackup_monitoring::ProcessLiveness;
use stackup_process_state::ProcessState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::ProcessEntry;

/// Cloneable handle to the supervisor.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("processes", &self.process_names())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor for `config.processes`. Nothing is launched yet.
    ///
    /// Processes are kept in launch order: ascending priority, ties in
    /// configuration order.
    pub fn new(config: SupervisorConfig) -> ProcessResult<Self> {
        let SupervisorConfig {
            supervisor: options,
            mut processes,
        } = config;
        info!("Creating supervisor with {} processes", processes.len());

        // stable: equal priorities keep configuration order
        processes.sort_by_key(|process| process.priority);

        let log_router = Arc::new(LogRouter::new(options.log_router_config()));
        let mut entries = Vec::with_capacity(processes.len());
        let mut index = HashMap::with_capacity(processes.len());

        for process in processes {
            if index.contains_key(&process.name) {
                return Err(ProcessError::configuration(
                    &process.name,
                    "duplicate process name",
                ));
            }
            log_router.register(&process.name)?;

            let entry = Arc::new(ProcessEntry::new(process));
            index.insert(entry.name().to_string(), Arc::clone(&entry));
            debug!("Registered process: {}", entry.name());
            entries.push(entry);
        }

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                options,
                entries,
                index,
                log_router,
                shutdown_token: CancellationToken::new(),
            }),
        })
    }

    /// Shorthand for a supervisor with default options.
    pub fn with_processes(processes: Vec<ManagedProcessConfig>) -> ProcessResult<Self> {
        Self::new(SupervisorConfig::new(processes))
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    /// Managed process names in launch order.
    pub fn process_names(&self) -> Vec<String> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.index.contains_key(name)
    }

    /// Launch every process that has not run yet (or was stopped), in launch
    /// order.
    ///
    /// Processes in Exited or FatalFailed are skipped: their restart policy or
    /// the restart-storm bound already decided, and only `start` or `restart`
    /// brings them back. A failing launch does not stop the remaining ones; all
    /// failures are reported together as [`ProcessError::BatchFailed`].
    pub async fn launch_all(&self) -> ProcessResult<()> {
        self.launch_matching(|_| true).await
    }

    /// Like [`launch_all`](Self::launch_all), restricted to `names`.
    pub async fn launch_selected(&self, names: &[String]) -> ProcessResult<()> {
        self.launch_matching(|name| names.iter().any(|n| n == name)).await
    }

    async fn launch_matching<F>(&self, selected: F) -> ProcessResult<()>
    where
        F: Fn(&str) -> bool,
    {
        let entries: Vec<_> = self
            .inner
            .entries
            .iter()
            .filter(|entry| selected(entry.name()))
            .collect();
        info!("Launching {} processes", entries.len());
        let stagger = self.inner.options.launch_stagger;
        let mut failed = Vec::new();
        let mut launched = false;

        for entry in entries {
            if launched && !stagger.is_zero() {
                tokio::select! {
                    _ = self.inner.shutdown_token.cancelled() => {}
                    _ = tokio::time::sleep(stagger) => {}
                }
            }

            match self.inner.launch_stopped_entry(entry).await {
                Ok(started) => launched |= started,
                Err(e) => {
                    error!("Failed to launch process {}: {}", entry.name(), e);
                    failed.push(entry.name().to_string());
                    launched = true;
                }
            }
        }

        if failed.is_empty() {
            info!("All processes launched");
            Ok(())
        } else {
            Err(ProcessError::BatchFailed { failed })
        }
    }

    /// Launch one process. A process that is already starting or running is
    /// left alone.
    pub async fn start_process(&self, name: &str) -> ProcessResult<ProcessStatus> {
        let entry = self.inner.entry(name)?;
        info!("Starting process: {}", name);
        self.inner.start_entry(&entry).await?;
        Ok(entry.status())
    }

    /// Stop one process and cancel any pending automatic restart.
    pub async fn stop(&self, name: &str) -> ProcessResult<ProcessStatus> {
        let entry = self.inner.entry(name)?;
        info!("Stopping process: {}", name);
        self.inner.stop_entry(&entry, "stop requested").await?;
        Ok(entry.status())
    }

    /// Stop, reset the restart counter and launch again.
    pub async fn restart(&self, name: &str) -> ProcessResult<ProcessStatus> {
        let entry = self.inner.entry(name)?;
        info!("Restarting process: {}", name);
        self.inner.restart_entry(&entry).await?;
        Ok(entry.status())
    }

    pub fn status(&self, name: &str) -> ProcessResult<ProcessStatus> {
        Ok(self.inner.entry(name)?.status())
    }

    /// Status of every process, in launch order.
    pub fn status_all(&self) -> Vec<ProcessStatus> {
        self.inner.entries.iter().map(|entry| entry.status()).collect()
    }

    pub fn state(&self, name: &str) -> ProcessResult<ProcessState> {
        Ok(self.inner.entry(name)?.state())
    }

    /// The last `lines` lines of captured output, oldest first.
    pub fn tail_logs(&self, name: &str, lines: usize) -> ProcessResult<Vec<LogEntry>> {
        self.inner.entry(name)?;
        self.inner.log_router.tail(name, lines)
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_token.is_cancelled()
    }

    /// Stop every process concurrently, then close the log sinks.
    ///
    /// Pending restarts are cancelled and later launches are refused. Calling
    /// it again is harmless.
    pub async fn shutdown(&self) -> ProcessResult<()> {
        info!("Shutting down supervisor");
        self.inner.shutdown_token.cancel();

        let stops = self.inner.entries.iter().map(|entry| async move {
            let result = self.inner.stop_entry(entry, "supervisor shutdown").await;
            (entry.name().to_string(), result)
        });

        let mut failed = Vec::new();
        for (name, result) in join_all(stops).await {
            if let Err(e) = result {
                error!("Failed to stop process {} during shutdown: {}", name, e);
                failed.push(name);
            }
        }

        self.inner.log_router.shutdown();

        if failed.is_empty() {
            info!("Supervisor shut down");
            Ok(())
        } else {
            warn!("Supervisor shut down with {} processes not stopped", failed.len());
            Err(ProcessError::stop_failed(
                "supervisor",
                format!("processes still running: {}", failed.join(", ")),
            ))
        }
    }
}

impl ProcessLiveness for ProcessSupervisor {
    fn is_running(&self, name: &str) -> Option<bool> {
        self.inner
            .index
            .get(name)
            .map(|entry| entry.state() == ProcessState::Running)
    }
}
