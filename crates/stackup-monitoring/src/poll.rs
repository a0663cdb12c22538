//! Bounded-retry polling.
//!
//! [`BoundedPoll`] owns the retry cadence around a [`HealthProbe`]: it makes
//! at most `max_attempts` attempts, sleeps `poll_interval` between two
//! attempts (never after the last one) and stops early when the probe reports
//! healthy, when the per-attempt hook aborts, or when cancelled.

use crate::probe::HealthProbe;
use crate::spec::HealthCheckSpec;
use crate::ProbeReport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Decision returned by the per-attempt hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Abort(String),
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Healthy {
        attempts: u32,
        report: ProbeReport,
    },
    Exhausted {
        attempts: u32,
        last_report: ProbeReport,
    },
    Aborted {
        attempts: u32,
        reason: String,
        last_report: ProbeReport,
    },
    Cancelled {
        attempts: u32,
        last_report: Option<ProbeReport>,
    },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Healthy { attempts, .. }
            | PollOutcome::Exhausted { attempts, .. }
            | PollOutcome::Aborted { attempts, .. }
            | PollOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn last_report(&self) -> Option<&ProbeReport> {
        match self {
            PollOutcome::Healthy { report, .. } => Some(report),
            PollOutcome::Exhausted { last_report, .. }
            | PollOutcome::Aborted { last_report, .. } => Some(last_report),
            PollOutcome::Cancelled { last_report, .. } => last_report.as_ref(),
        }
    }
}

/// Attempt counter with interval pacing.
#[derive(Debug, Clone)]
pub struct BoundedPoll {
    max_attempts: u32,
    poll_interval: Duration,
    attempts: u32,
}

impl BoundedPoll {
    pub fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            max_attempts,
            poll_interval,
            attempts: 0,
        }
    }

    pub fn from_spec(spec: &HealthCheckSpec) -> Self {
        Self::new(spec.max_attempts, spec.poll_interval)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait until the next attempt may start and return its 1-based number.
    ///
    /// The first call returns immediately. Returns `None` once all attempts are
    /// used or when `cancel` fires during the wait.
    pub async fn next_attempt(&mut self, cancel: &CancellationToken) -> Option<u32> {
        if self.attempts >= self.max_attempts || cancel.is_cancelled() {
            return None;
        }

        if self.attempts > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.attempts += 1;
        Some(self.attempts)
    }

    /// Probe `spec` until it is healthy, the attempts run out, `on_attempt`
    /// aborts, or `cancel` fires.
    ///
    /// `on_attempt` sees every report, healthy or not, before the next wait.
    pub async fn run<P, F>(
        mut self,
        probe: &P,
        spec: &HealthCheckSpec,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> PollOutcome
    where
        P: HealthProbe + ?Sized,
        F: FnMut(u32, &ProbeReport) -> PollControl,
    {
        let mut last_report: Option<ProbeReport> = None;

        while let Some(attempt) = self.next_attempt(cancel).await {
            let report = tokio::select! {
                _ = cancel.cancelled() => {
                    return PollOutcome::Cancelled { attempts: attempt, last_report };
                }
                report = probe.check(spec) => report,
            };

            let control = on_attempt(attempt, &report);

            if report.is_healthy() {
                return PollOutcome::Healthy {
                    attempts: attempt,
                    report,
                };
            }

            debug!(
                attempt,
                max_attempts = self.max_attempts,
                "Health check not passing: {}",
                report.summary()
            );

            if let PollControl::Abort(reason) = control {
                return PollOutcome::Aborted {
                    attempts: attempt,
                    reason,
                    last_report: report,
                };
            }

            last_report = Some(report);
        }

        match last_report {
            Some(last_report) if !cancel.is_cancelled() => PollOutcome::Exhausted {
                attempts: self.attempts,
                last_report,
            },
            last_report => PollOutcome::Cancelled {
                attempts: self.attempts,
                last_report,
            },
        }
    }
}
