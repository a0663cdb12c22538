//! Single-attempt health probing.

use crate::command::check_command;
use crate::http::check_http;
use crate::spec::{HealthCheckSpec, HealthTarget};
use crate::tcp::check_tcp;
use crate::{millis, HealthCheckError, HealthOutcome, ProbeReport, TargetReport};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Answers whether a managed process is currently running.
pub trait ProcessLiveness: Send + Sync {
    /// `None` when no process with that name is managed.
    fn is_running(&self, name: &str) -> Option<bool>;
}

/// Performs one attempt against a health contract. Never retries.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe a single target. Time bounds are applied by [`HealthProbe::check`].
    async fn check_target(&self, target: &HealthTarget) -> HealthOutcome;

    /// Probe every target of `spec` concurrently, each bounded by
    /// `spec.single_attempt_timeout`.
    async fn check(&self, spec: &HealthCheckSpec) -> ProbeReport {
        let attempts = spec.targets.iter().map(|target| async move {
            let started = Instant::now();
            let attempt = timeout(spec.single_attempt_timeout, self.check_target(target));
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(_) => HealthCheckError::Timeout {
                    target: target.to_string(),
                    timeout_ms: millis(spec.single_attempt_timeout),
                }
                .into(),
            };
            debug!(target = %target, outcome = %outcome, "Health probe");
            TargetReport {
                target: target.to_string(),
                outcome,
                response_time_ms: millis(started.elapsed()),
            }
        });

        ProbeReport::new(join_all(attempts).await)
    }
}

/// Probe backed by real network, command and process checks.
#[derive(Clone, Default)]
pub struct DefaultHealthProbe {
    liveness: Option<Arc<dyn ProcessLiveness>>,
}

impl DefaultHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `process` targets, answered by `liveness`.
    pub fn with_liveness(liveness: Arc<dyn ProcessLiveness>) -> Self {
        Self {
            liveness: Some(liveness),
        }
    }
}

impl std::fmt::Debug for DefaultHealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultHealthProbe")
            .field("liveness", &self.liveness.is_some())
            .finish()
    }
}

#[async_trait]
impl HealthProbe for DefaultHealthProbe {
    async fn check_target(&self, target: &HealthTarget) -> HealthOutcome {
        let result = match target {
            HealthTarget::Http {
                url,
                expected_status,
                body_contains,
            } => check_http(url, expected_status, body_contains.as_deref()).await,
            HealthTarget::Tcp { address } => check_tcp(address).await,
            HealthTarget::Command { command, args } => check_command(command, args).await,
            HealthTarget::Process { name } => Ok(self.check_process(name)),
        };

        result.unwrap_or_else(HealthOutcome::from)
    }
}

impl DefaultHealthProbe {
    fn check_process(&self, name: &str) -> HealthOutcome {
        let Some(liveness) = self.liveness.as_ref() else {
            return HealthOutcome::Error(format!(
                "process target '{}' requires a supervisor",
                name
            ));
        };

        match liveness.is_running(name) {
            Some(true) => HealthOutcome::Healthy,
            Some(false) => HealthOutcome::Unhealthy(format!("process '{}' is not running", name)),
            None => HealthOutcome::Error(format!("unknown process '{}'", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct SlowProbe;

    #[async_trait]
    impl HealthProbe for SlowProbe {
        async fn check_target(&self, target: &HealthTarget) -> HealthOutcome {
            if let HealthTarget::Tcp { address } = target {
                if address == "slow" {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
            HealthOutcome::Healthy
        }
    }

    struct Running(&'static str);

    impl ProcessLiveness for Running {
        fn is_running(&self, name: &str) -> Option<bool> {
            match name {
                "missing" => None,
                _ => Some(name == self.0),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_is_bounded_per_target() {
        let spec = HealthCheckSpec::new(vec![HealthTarget::tcp("fast"), HealthTarget::tcp("slow")])
            .with_timing(Duration::from_millis(500), Duration::from_secs(1));

        let started = Instant::now();
        let report = SlowProbe.check(&spec).await;

        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(report.targets[0].outcome, HealthOutcome::Healthy);
        match &report.targets[1].outcome {
            HealthOutcome::Error(reason) => assert!(reason.contains("timeout"), "{}", reason),
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_process_targets_use_liveness() {
        let probe = DefaultHealthProbe::with_liveness(Arc::new(Running("worker")));

        assert_eq!(
            probe.check_target(&HealthTarget::process("worker")).await,
            HealthOutcome::Healthy
        );
        assert!(matches!(
            probe.check_target(&HealthTarget::process("api")).await,
            HealthOutcome::Unhealthy(_)
        ));
        assert!(matches!(
            probe.check_target(&HealthTarget::process("missing")).await,
            HealthOutcome::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_process_target_without_supervisor() {
        let outcome = DefaultHealthProbe::new()
            .check_target(&HealthTarget::process("worker"))
            .await;
        assert!(matches!(outcome, HealthOutcome::Error(_)));
    }
}
