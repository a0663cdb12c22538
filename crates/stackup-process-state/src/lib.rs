use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackup_common::errors::{ProcessError, ProcessResult};
use std::collections::VecDeque;
use std::fmt;

const MAX_HISTORY: usize = 100;

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Not running and not scheduled to run
    Stopped,
    /// Spawned, waiting for the ready signal
    Starting,
    /// Alive and declared ready
    Running,
    /// Exited on its own; a restart may be pending
    Exited,
    /// Launch failed or the restart bound was reached; waits for a manual restart
    FatalFailed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::FatalFailed => write!(f, "fatal_failed"),
        }
    }
}

impl ProcessState {
    /// True while an execution is live (spawned and not yet reaped).
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Validates and records the lifecycle transitions of one process.
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process_id: String,
    current_state: ProcessState,
    history: VecDeque<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl ProcessStateMachine {
    pub fn new(process_id: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
            current_state: ProcessState::Stopped,
            history: VecDeque::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    /// Check if a transition from the current state to `target` is allowed.
    pub fn is_valid_transition(&self, target: ProcessState) -> bool {
        use ProcessState::*;

        match (self.current_state, target) {
            (Stopped, Starting) => true,

            (Starting, Running) => true,
            (Starting, Exited) => true, // early exit before ready
            (Starting, FatalFailed) => true, // launch error

            (Running, Exited) => true,

            (Exited, Starting) => true, // automatic restart
            (Exited, FatalFailed) => true, // restart bound reached

            (FatalFailed, Starting) => true, // manual restart

            // stop is accepted from everywhere
            (_, Stopped) => true,

            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Move to `target`, recording the transition.
    ///
    /// Re-entering the current state is accepted and not recorded.
    pub fn transition_to(
        &mut self,
        target: ProcessState,
        reason: Option<String>,
    ) -> ProcessResult<()> {
        if !self.is_valid_transition(target) {
            return Err(ProcessError::invalid_state(
                &self.process_id,
                target.to_string(),
                self.current_state.to_string(),
            ));
        }

        if target == self.current_state {
            return Ok(());
        }

        let now = Utc::now();
        tracing::debug!(
            "Process {} transitioned from {} to {}",
            self.process_id,
            self.current_state,
            target
        );

        self.history.push_back(StateTransition {
            from_state: self.current_state,
            to_state: target,
            timestamp: now,
            reason,
        });
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        self.current_state = target;
        self.last_transition_time = now;
        Ok(())
    }

    pub fn transition_to_starting(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ProcessState::Starting, Some(reason.into()))
    }

    pub fn transition_to_running(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessState::Running, Some("ready".to_string()))
    }

    pub fn transition_to_exited(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ProcessState::Exited, Some(reason.into()))
    }

    pub fn transition_to_fatal(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ProcessState::FatalFailed, Some(reason.into()))
    }

    pub fn transition_to_stopped(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ProcessState::Stopped, Some(reason.into()))
    }
}
