use serde::{Deserialize, Serialize};
use stackup_common::duration::serde_duration;
use stackup_common::RestartPolicy;
use stackup_log_collection::LogRouterConfig;
use stackup_process::SpawnRequest;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod validation;

/// Everything the supervisor needs: global options plus the managed processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub processes: Vec<ManagedProcessConfig>,
}

impl SupervisorConfig {
    pub fn new(processes: Vec<ManagedProcessConfig>) -> Self {
        Self {
            supervisor: SupervisorOptions::default(),
            processes,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validation::validate_config(self)
    }
}

/// Supervisor-wide options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Directory for `<name>.log` files; output is only kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,

    /// Lines of output kept in memory per process for diagnostics.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    /// Re-emit captured process output through the supervisor's own log.
    #[serde(default)]
    pub echo_output: bool,

    /// Pause between two launches of `launch_all`.
    #[serde(default, with = "serde_duration")]
    pub launch_stagger: Duration,

    /// HTTP control API; disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlConfig>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            log_directory: None,
            log_tail_lines: default_log_tail_lines(),
            echo_output: false,
            launch_stagger: Duration::ZERO,
            control: None,
        }
    }
}

impl SupervisorOptions {
    pub fn log_router_config(&self) -> LogRouterConfig {
        LogRouterConfig {
            log_directory: self.log_directory.clone(),
            tail_lines: self.log_tail_lines,
            echo: self.echo_output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Socket address of the control API, e.g. `127.0.0.1:7070`.
    pub listen: String,
}

/// One managed process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedProcessConfig {
    #[serde(alias = "id")]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Start order, ascending; ties keep configuration order.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Automatic restarts allowed within one restart window before the
    /// process is declared a restart storm.
    #[serde(default = "default_max_consecutive_restarts")]
    pub max_consecutive_restarts: u32,

    #[serde(
        with = "serde_duration",
        alias = "restart_window_seconds",
        default = "default_restart_window"
    )]
    pub restart_window: Duration,

    #[serde(
        with = "serde_duration",
        alias = "stop_grace_period_seconds",
        default = "default_stop_grace_period"
    )]
    pub stop_grace_period: Duration,

    /// Delay before the first automatic restart; zero restarts immediately.
    #[serde(with = "serde_duration", default = "default_restart_delay")]
    pub restart_delay: Duration,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(with = "serde_duration", default = "default_max_restart_delay")]
    pub max_restart_delay: Duration,

    /// Time a fresh execution must stay alive before it counts as running.
    #[serde(with = "serde_duration", default)]
    pub ready_after: Duration,
}

impl ManagedProcessConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            working_directory: None,
            environment: HashMap::new(),
            priority: 0,
            restart_policy: RestartPolicy::default(),
            max_consecutive_restarts: default_max_consecutive_restarts(),
            restart_window: default_restart_window(),
            stop_grace_period: default_stop_grace_period(),
            restart_delay: default_restart_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_restart_delay: default_max_restart_delay(),
            ready_after: Duration::ZERO,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub(crate) fn spawn_request(&self) -> SpawnRequest {
        SpawnRequest {
            id: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
        }
    }
}

fn default_log_tail_lines() -> usize {
    200
}

fn default_max_consecutive_restarts() -> u32 {
    5
}

fn default_restart_window() -> Duration {
    Duration::from_secs(60)
}

fn default_stop_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_restart_delay() -> Duration {
    Duration::from_secs(30)
}
