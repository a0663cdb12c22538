//! Dependency-gated bring-up.
//!
//! Groups are processed strictly in order. For each group every member that
//! is not already up is launched, then the group's health check is polled
//! with [`BoundedPoll`] until it passes, the attempts run out, or a managed
//! member gives up restarting. Only a healthy (or skipped) group releases the
//! next one; any failure ends the bring-up with a [`BringUpFailure`].

use crate::config::{ExternalService, GroupConfig, StackConfig};
use crate::error::OrchestrationError;
use crate::launcher::{CommandLauncher, ExternalLauncher};
use crate::report::{
    BringUpFailure, BringUpReport, FailureReason, GroupOutcome, GroupSummary, MemberDiagnostic,
    StartupEvent, Timeline,
};
use parking_lot::Mutex;
use stackup_monitoring::{
    BoundedPoll, DefaultHealthProbe, HealthCheckSpec, HealthProbe, PollControl, PollOutcome,
    ProbeReport,
};
use stackup_process_state::ProcessState;
use stackup_supervisor::ProcessSupervisor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_DIAGNOSTIC_LINES: usize = 20;

enum Member<'a> {
    Managed(&'a str),
    External(&'a ExternalService),
}

pub struct StartupOrchestrator {
    supervisor: ProcessSupervisor,
    probe: Arc<dyn HealthProbe>,
    launcher: Arc<dyn ExternalLauncher>,
    external_services: HashMap<String, ExternalService>,
    started_external: Mutex<HashSet<String>>,
    cancel: CancellationToken,
    diagnostic_lines: usize,
}

impl std::fmt::Debug for StartupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupOrchestrator")
            .field("supervisor", &self.supervisor)
            .field("external_services", &self.external_services.len())
            .finish()
    }
}

impl StartupOrchestrator {
    /// Orchestrator over `supervisor` using the real probe and command launcher.
    ///
    /// Bring-up is cancelled when the supervisor shuts down.
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        let probe = DefaultHealthProbe::with_liveness(Arc::new(supervisor.clone()));
        let cancel = supervisor.shutdown_token();
        Self {
            supervisor,
            probe: Arc::new(probe),
            launcher: Arc::new(CommandLauncher),
            external_services: HashMap::new(),
            started_external: Mutex::new(HashSet::new()),
            cancel,
            diagnostic_lines: DEFAULT_DIAGNOSTIC_LINES,
        }
    }

    pub fn from_config(config: &StackConfig, supervisor: ProcessSupervisor) -> Self {
        Self::new(supervisor).with_external_services(config.external_services.clone())
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ExternalLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_external_services(mut self, services: Vec<ExternalService>) -> Self {
        self.external_services = services
            .into_iter()
            .map(|service| (service.name.clone(), service))
            .collect();
        self
    }

    /// Captured output lines included per member in a failure.
    pub fn with_diagnostic_lines(mut self, lines: usize) -> Self {
        self.diagnostic_lines = lines;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub async fn bring_up(&self, groups: &[GroupConfig]) -> Result<BringUpReport, BringUpFailure> {
        let started = Instant::now();
        let mut timeline = Timeline::default();
        let mut completed = Vec::with_capacity(groups.len());
        info!("Bringing up {} dependency groups", groups.len());

        for group in groups {
            if self.cancel.is_cancelled() {
                let reason = FailureReason::Cancelled { attempts: 0 };
                return Err(self.fail(group, reason, None, completed, timeline));
            }

            timeline.record(StartupEvent::GroupStarting {
                group: group.name.clone(),
                members: group.members.clone(),
            });

            if let Err((member, error)) = self.launch_members(group, &mut timeline).await {
                let reason = FailureReason::LaunchFailed {
                    member,
                    error: error.to_string(),
                };
                return Err(self.fail(group, reason, None, completed, timeline));
            }

            let Some(spec) = group.gate() else {
                timeline.record(StartupEvent::GroupSkipped {
                    group: group.name.clone(),
                });
                completed.push(GroupSummary {
                    name: group.name.clone(),
                    outcome: GroupOutcome::Skipped,
                });
                continue;
            };

            let (outcome, fatal_member) = self.poll_group(group, spec, &mut timeline).await;
            let (reason, last_report) = match (outcome, fatal_member) {
                (PollOutcome::Healthy { attempts, .. }, _) => {
                    timeline.record(StartupEvent::GroupHealthy {
                        group: group.name.clone(),
                        attempts,
                    });
                    completed.push(GroupSummary {
                        name: group.name.clone(),
                        outcome: GroupOutcome::Healthy { attempts },
                    });
                    continue;
                }
                (PollOutcome::Exhausted { attempts, last_report }, _) => {
                    (FailureReason::HealthCheckTimeout { attempts }, Some(last_report))
                }
                (
                    PollOutcome::Aborted {
                        attempts,
                        last_report,
                        ..
                    },
                    Some(member),
                ) => (FailureReason::MemberFatal { member, attempts }, Some(last_report)),
                (
                    PollOutcome::Aborted {
                        attempts,
                        last_report,
                        ..
                    },
                    None,
                ) => (FailureReason::Cancelled { attempts }, Some(last_report)),
                (PollOutcome::Cancelled { attempts, last_report }, _) => {
                    (FailureReason::Cancelled { attempts }, last_report)
                }
            };

            return Err(self.fail(group, reason, last_report, completed, timeline));
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!("All {} groups up in {}ms", completed.len(), elapsed_ms);
        Ok(BringUpReport {
            groups: completed,
            timeline,
            elapsed_ms,
        })
    }

    /// Launch every member that is not up yet, in member order.
    async fn launch_members(
        &self,
        group: &GroupConfig,
        timeline: &mut Timeline,
    ) -> Result<(), (String, OrchestrationError)> {
        for name in &group.members {
            let launched = match self.resolve(group, name) {
                Ok(member) => self.launch_member(member).await,
                Err(e) => Err(e),
            };

            match launched {
                Ok(true) => timeline.record(StartupEvent::MemberLaunched {
                    group: group.name.clone(),
                    member: name.clone(),
                    external: self.external_services.contains_key(name),
                }),
                Ok(false) => debug!("Member {} of group {} is already up", name, group.name),
                Err(e) => return Err((name.clone(), e)),
            }
        }
        Ok(())
    }

    /// Returns whether the member was launched by this call.
    async fn launch_member(&self, member: Member<'_>) -> Result<bool, OrchestrationError> {
        match member {
            Member::Managed(name) => {
                if self.supervisor.state(name)?.is_live() {
                    return Ok(false);
                }
                self.supervisor.start_process(name).await?;
                Ok(true)
            }
            Member::External(service) => {
                if self.started_external.lock().contains(&service.name) {
                    return Ok(false);
                }
                self.launcher.launch(service).await?;
                self.started_external.lock().insert(service.name.clone());
                Ok(true)
            }
        }
    }

    fn resolve<'a>(
        &'a self,
        group: &GroupConfig,
        name: &'a str,
    ) -> Result<Member<'a>, OrchestrationError> {
        if self.supervisor.contains(name) {
            Ok(Member::Managed(name))
        } else if let Some(service) = self.external_services.get(name) {
            Ok(Member::External(service))
        } else {
            Err(OrchestrationError::UnknownMember {
                group: group.name.clone(),
                member: name.to_string(),
            })
        }
    }

    /// Poll `spec`; between unhealthy attempts a fatal-failed managed member
    /// aborts the poll and is returned alongside the outcome.
    async fn poll_group(
        &self,
        group: &GroupConfig,
        spec: &HealthCheckSpec,
        timeline: &mut Timeline,
    ) -> (PollOutcome, Option<String>) {
        let managed: Vec<&str> = group
            .members
            .iter()
            .map(String::as_str)
            .filter(|name| self.supervisor.contains(name))
            .collect();
        let mut fatal_member = None;
        debug!(
            group = %group.name,
            max_attempts = spec.max_attempts,
            max_wait = ?spec.max_wait(),
            "Polling group health"
        );

        let outcome = BoundedPoll::from_spec(spec)
            .run(self.probe.as_ref(), spec, &self.cancel, |attempt, report| {
                let healthy = report.is_healthy();
                timeline.record(StartupEvent::ProbeAttempt {
                    group: group.name.clone(),
                    attempt,
                    max_attempts: spec.max_attempts,
                    healthy,
                    summary: report.summary(),
                });
                if healthy {
                    return PollControl::Continue;
                }

                let fatal = managed.iter().find(|name| {
                    matches!(self.supervisor.state(name), Ok(ProcessState::FatalFailed))
                });
                match fatal {
                    Some(name) => {
                        fatal_member = Some(name.to_string());
                        PollControl::Abort(format!("{} is fatal_failed", name))
                    }
                    None => PollControl::Continue,
                }
            })
            .await;

        (outcome, fatal_member)
    }

    fn fail(
        &self,
        group: &GroupConfig,
        reason: FailureReason,
        last_probe: Option<ProbeReport>,
        completed_groups: Vec<GroupSummary>,
        mut timeline: Timeline,
    ) -> BringUpFailure {
        timeline.record(StartupEvent::GroupFailed {
            group: group.name.clone(),
            reason: reason.to_string(),
        });

        BringUpFailure {
            group: group.name.clone(),
            reason,
            members: group.members.iter().map(|m| self.diagnose(m)).collect(),
            last_probe,
            completed_groups,
            timeline,
        }
    }

    fn diagnose(&self, name: &str) -> MemberDiagnostic {
        let Ok(status) = self.supervisor.status(name) else {
            return MemberDiagnostic::external(name);
        };

        let log_tail = self
            .supervisor
            .tail_logs(name, self.diagnostic_lines)
            .map(|entries| entries.iter().map(ToString::to_string).collect())
            .unwrap_or_default();

        MemberDiagnostic {
            name: status.name,
            external: false,
            state: Some(status.state),
            pid: status.pid,
            restart_count: status.restart_count,
            last_exit: status.last_exit,
            last_error: status.last_error,
            log_tail,
        }
    }
}
