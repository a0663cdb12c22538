//! Bring-up event timeline, success report and failure diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stackup_common::ExitInfo;
use stackup_monitoring::ProbeReport;
use stackup_process_state::ProcessState;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StartupEvent {
    GroupStarting {
        group: String,
        members: Vec<String>,
    },
    MemberLaunched {
        group: String,
        member: String,
        external: bool,
    },
    ProbeAttempt {
        group: String,
        attempt: u32,
        max_attempts: u32,
        healthy: bool,
        summary: String,
    },
    GroupHealthy {
        group: String,
        attempts: u32,
    },
    GroupSkipped {
        group: String,
    },
    GroupFailed {
        group: String,
        reason: String,
    },
}

impl StartupEvent {
    pub fn group(&self) -> &str {
        match self {
            StartupEvent::GroupStarting { group, .. }
            | StartupEvent::MemberLaunched { group, .. }
            | StartupEvent::ProbeAttempt { group, .. }
            | StartupEvent::GroupHealthy { group, .. }
            | StartupEvent::GroupSkipped { group }
            | StartupEvent::GroupFailed { group, .. } => group,
        }
    }
}

impl fmt::Display for StartupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupEvent::GroupStarting { group, members } => {
                write!(f, "group {} starting ({})", group, members.join(", "))
            }
            StartupEvent::MemberLaunched {
                group,
                member,
                external,
            } => {
                let kind = if *external { "external service" } else { "process" };
                write!(f, "group {}: launched {} {}", group, kind, member)
            }
            StartupEvent::ProbeAttempt {
                group,
                attempt,
                max_attempts,
                healthy,
                summary,
            } => {
                let verdict = if *healthy { "healthy" } else { "not healthy" };
                write!(
                    f,
                    "group {}: probe {}/{} {} ({})",
                    group, attempt, max_attempts, verdict, summary
                )
            }
            StartupEvent::GroupHealthy { group, attempts } => {
                write!(f, "group {} healthy after {} attempts", group, attempts)
            }
            StartupEvent::GroupSkipped { group } => {
                write!(f, "group {} launched without waiting", group)
            }
            StartupEvent::GroupFailed { group, reason } => {
                write!(f, "group {} failed: {}", group, reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StartupEvent,
}

/// Ordered record of a bring-up. Every event is also logged when recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn record(&mut self, event: StartupEvent) {
        match &event {
            StartupEvent::GroupFailed { .. } => warn!("{}", event),
            StartupEvent::ProbeAttempt { healthy: false, .. } => warn!("{}", event),
            _ => info!("{}", event),
        }
        self.entries.push(TimelineEntry {
            at: Utc::now(),
            event,
        });
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &StartupEvent> {
        self.entries.iter().map(|entry| &entry.event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GroupOutcome {
    Healthy { attempts: u32 },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    #[serde(flatten)]
    pub outcome: GroupOutcome,
}

/// Every group was brought up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BringUpReport {
    pub groups: Vec<GroupSummary>,
    pub timeline: Timeline,
    pub elapsed_ms: u64,
}

impl BringUpReport {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A member could not be launched; the group was never polled.
    LaunchFailed { member: String, error: String },
    /// Every attempt ran without the group becoming healthy.
    HealthCheckTimeout { attempts: u32 },
    /// A managed member gave up restarting while the group was polled.
    MemberFatal { member: String, attempts: u32 },
    Cancelled { attempts: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::LaunchFailed { member, error } => {
                write!(f, "failed to launch {}: {}", member, error)
            }
            FailureReason::HealthCheckTimeout { attempts } => {
                write!(f, "health check not passing after {} attempts", attempts)
            }
            FailureReason::MemberFatal { member, attempts } => write!(
                f,
                "member {} failed permanently during health check attempt {}",
                member, attempts
            ),
            FailureReason::Cancelled { attempts } => {
                write!(f, "cancelled after {} attempts", attempts)
            }
        }
    }
}

/// What is known about one member of the failed group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberDiagnostic {
    pub name: String,
    pub external: bool,
    pub state: Option<ProcessState>,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub last_exit: Option<ExitInfo>,
    pub last_error: Option<String>,
    /// Most recent captured output lines, oldest first.
    pub log_tail: Vec<String>,
}

impl MemberDiagnostic {
    pub fn external(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external: true,
            state: None,
            pid: None,
            restart_count: 0,
            last_exit: None,
            last_error: None,
            log_tail: Vec::new(),
        }
    }
}

/// Why and where a bring-up stopped. `Display` renders the operator dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BringUpFailure {
    pub group: String,
    pub reason: FailureReason,
    pub members: Vec<MemberDiagnostic>,
    pub last_probe: Option<ProbeReport>,
    pub completed_groups: Vec<GroupSummary>,
    pub timeline: Timeline,
}

impl BringUpFailure {
    pub fn member(&self, name: &str) -> Option<&MemberDiagnostic> {
        self.members.iter().find(|m| m.name == name)
    }
}

impl fmt::Display for BringUpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "startup failed in group '{}': {}", self.group, self.reason)?;

        if self.completed_groups.is_empty() {
            writeln!(f, "  groups up: none")?;
        } else {
            let names: Vec<&str> = self.completed_groups.iter().map(|g| g.name.as_str()).collect();
            writeln!(f, "  groups up: {}", names.join(", "))?;
        }

        if let Some(ref report) = self.last_probe {
            writeln!(f, "  last probe ({}):", report.checked_at.to_rfc3339())?;
            for target in &report.targets {
                writeln!(
                    f,
                    "    {}: {} ({}ms)",
                    target.target, target.outcome, target.response_time_ms
                )?;
            }
        }

        for member in &self.members {
            if member.external {
                writeln!(f, "  member {} (external service)", member.name)?;
                continue;
            }

            let state = member
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let last_exit = member
                .last_exit
                .map(|e| e.to_string())
                .unwrap_or_else(|| "none".to_string());
            writeln!(
                f,
                "  member {}: state {}, restarts {}, last exit {}",
                member.name, state, member.restart_count, last_exit
            )?;
            if let Some(ref error) = member.last_error {
                writeln!(f, "    last error: {}", error)?;
            }
            for line in &member.log_tail {
                writeln!(f, "    | {}", line)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for BringUpFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use stackup_monitoring::{HealthOutcome, TargetReport};

    #[test]
    fn test_failure_dump_names_group_and_members() {
        let failure = BringUpFailure {
            group: "storage".to_string(),
            reason: FailureReason::HealthCheckTimeout { attempts: 5 },
            members: vec![
                MemberDiagnostic {
                    name: "cache".to_string(),
                    external: false,
                    state: Some(ProcessState::Running),
                    pid: Some(42),
                    restart_count: 2,
                    last_exit: Some(ExitInfo::from_code(137)),
                    last_error: None,
                    log_tail: vec!["listening on 6380".to_string()],
                },
                MemberDiagnostic::external("postgres"),
            ],
            last_probe: Some(ProbeReport::new(vec![TargetReport {
                target: "tcp 127.0.0.1:6379".to_string(),
                outcome: HealthOutcome::Error("connection refused".to_string()),
                response_time_ms: 1,
            }])),
            completed_groups: Vec::new(),
            timeline: Timeline::default(),
        };

        let dump = failure.to_string();
        assert!(dump.starts_with(
            "startup failed in group 'storage': health check not passing after 5 attempts"
        ));
        assert!(dump.contains("tcp 127.0.0.1:6379: error: connection refused"));
        assert!(dump.contains("member cache: state running, restarts 2, last exit exit code 137"));
        assert!(dump.contains("| listening on 6380"));
        assert!(dump.contains("member postgres (external service)"));
    }

    #[test]
    fn test_timeline_keeps_order() {
        let mut timeline = Timeline::default();
        timeline.record(StartupEvent::GroupStarting {
            group: "a".to_string(),
            members: vec!["x".to_string()],
        });
        timeline.record(StartupEvent::GroupSkipped {
            group: "a".to_string(),
        });

        let events: Vec<_> = timeline.events().cloned().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StartupEvent::GroupSkipped { .. }));
        assert!(timeline.entries()[0].at <= timeline.entries()[1].at);
    }
}
