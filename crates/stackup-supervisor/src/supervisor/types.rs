//! Status types exposed by the supervisor and the per-process records behind them.

use crate::config::ManagedProcessConfig;
use crate::lifecycle::RestartTracker;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use stackup_common::{ExitInfo, ProcessError, RestartPolicy};
use stackup_process_state::{ProcessState, ProcessStateMachine};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of one managed process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub priority: i32,
    pub restart_policy: RestartPolicy,
    /// Automatic restarts in the current restart window.
    pub restart_count: u32,
    /// Start of the most recent execution.
    pub started_at: Option<DateTime<Utc>>,
    /// Age of the live execution.
    pub uptime_ms: Option<u64>,
    pub state_since: DateTime<Utc>,
    pub last_exit: Option<ExitInfo>,
    pub last_error: Option<String>,
}

impl ProcessStatus {
    pub fn uptime(&self) -> Option<Duration> {
        self.uptime_ms.map(Duration::from_millis)
    }
}

/// The live execution of a process.
pub(crate) struct Execution {
    pub generation: u64,
    pub pid: u32,
    /// Set once by the monitor task when the child has been reaped.
    pub exit_rx: watch::Receiver<Option<ExitInfo>>,
}

/// Mutable runtime state, guarded by the entry's mutex.
pub(crate) struct ProcessRecord {
    pub state_machine: ProcessStateMachine,
    pub tracker: RestartTracker,
    /// Bumped on every launch; exit reports carrying an older value are stale.
    pub generation: u64,
    pub execution: Option<Execution>,
    pub pending_restart: Option<CancellationToken>,
    pub started_at: Option<DateTime<Utc>>,
    pub started_instant: Option<Instant>,
    pub last_exit: Option<ExitInfo>,
    pub last_error: Option<ProcessError>,
}

impl ProcessRecord {
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(&self.execution, Some(execution) if execution.generation == generation)
    }
}

struct StatusSnapshot {
    status: ProcessStatus,
    started_instant: Option<Instant>,
}

/// A managed process: its configuration, record and published status.
pub(crate) struct ProcessEntry {
    pub config: ManagedProcessConfig,
    pub record: Mutex<ProcessRecord>,
    snapshot: RwLock<StatusSnapshot>,
}

impl ProcessEntry {
    pub fn new(config: ManagedProcessConfig) -> Self {
        let record = ProcessRecord {
            state_machine: ProcessStateMachine::new(&config.name),
            tracker: RestartTracker::new(&config),
            generation: 0,
            execution: None,
            pending_restart: None,
            started_at: None,
            started_instant: None,
            last_exit: None,
            last_error: None,
        };
        let snapshot = StatusSnapshot {
            status: build_status(&config, &record),
            started_instant: None,
        };

        Self {
            config,
            record: Mutex::new(record),
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Publish `record` so status queries never wait on the record lock.
    pub fn publish(&self, record: &ProcessRecord) {
        let status = build_status(&self.config, record);
        *self.snapshot.write() = StatusSnapshot {
            status,
            started_instant: record.started_instant,
        };
    }

    pub fn state(&self) -> ProcessState {
        self.snapshot.read().status.state
    }

    pub fn status(&self) -> ProcessStatus {
        let snapshot = self.snapshot.read();
        let mut status = snapshot.status.clone();
        if status.state.is_live() {
            status.uptime_ms = snapshot
                .started_instant
                .map(|started| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        }
        status
    }
}

fn build_status(config: &ManagedProcessConfig, record: &ProcessRecord) -> ProcessStatus {
    ProcessStatus {
        name: config.name.clone(),
        state: record.state_machine.current_state(),
        pid: record.execution.as_ref().map(|e| e.pid),
        priority: config.priority,
        restart_policy: config.restart_policy,
        restart_count: record.tracker.consecutive_restarts(),
        started_at: record.started_at,
        uptime_ms: None,
        state_since: record.state_machine.last_transition_time(),
        last_exit: record.last_exit,
        last_error: record.last_error.as_ref().map(ToString::to_string),
    }
}
