// Restart policy evaluation and restart-storm detection

use crate::config::ManagedProcessConfig;
use stackup_common::{ExitInfo, RestartPolicy};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// What to do after an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// The restart policy does not ask for a restart.
    NotPermitted,
    /// Relaunch after `delay`; `attempt` counts restarts in the current window.
    Restart { attempt: u32, delay: Duration },
    /// The bound was reached inside the window; stop retrying.
    StormDetected { restarts: u32 },
}

/// Counts automatic restarts of one process within a sliding restart window.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    process_id: String,
    policy: RestartPolicy,
    max_consecutive_restarts: u32,
    restart_window: Duration,
    restart_delay: Duration,
    backoff_multiplier: f64,
    max_restart_delay: Duration,
    consecutive_restarts: u32,
    window_start: Option<Instant>,
}

impl RestartTracker {
    pub fn new(config: &ManagedProcessConfig) -> Self {
        Self {
            process_id: config.name.clone(),
            policy: config.restart_policy,
            max_consecutive_restarts: config.max_consecutive_restarts,
            restart_window: config.restart_window,
            restart_delay: config.restart_delay,
            backoff_multiplier: config.backoff_multiplier,
            max_restart_delay: config.max_restart_delay,
            consecutive_restarts: 0,
            window_start: None,
        }
    }

    pub fn consecutive_restarts(&self) -> u32 {
        self.consecutive_restarts
    }

    pub fn restart_window(&self) -> Duration {
        self.restart_window
    }

    /// Decide what follows `exit`, counting the restart if one is scheduled.
    pub fn on_exit(&mut self, exit: &ExitInfo) -> RestartDecision {
        if !self.policy.permits(exit) {
            debug!(
                "Restart policy '{}' does not restart {} after {}",
                self.policy, self.process_id, exit
            );
            return RestartDecision::NotPermitted;
        }

        let now = Instant::now();
        if let Some(start) = self.window_start {
            if now.duration_since(start) >= self.restart_window {
                debug!("Restart window elapsed for {}, resetting count", self.process_id);
                self.consecutive_restarts = 0;
                self.window_start = None;
            }
        }

        if self.consecutive_restarts >= self.max_consecutive_restarts {
            return RestartDecision::StormDetected {
                restarts: self.consecutive_restarts,
            };
        }

        self.window_start.get_or_insert(now);
        self.consecutive_restarts += 1;

        RestartDecision::Restart {
            attempt: self.consecutive_restarts,
            delay: self.calculate_restart_delay(self.consecutive_restarts),
        }
    }

    /// Forget restart history (operator-initiated restart).
    pub fn reset(&mut self) {
        self.consecutive_restarts = 0;
        self.window_start = None;
        debug!("Reset restart counters for process: {}", self.process_id);
    }

    /// `restart_delay * backoff_multiplier^(attempt - 1)`, capped at `max_restart_delay`.
    fn calculate_restart_delay(&self, attempt: u32) -> Duration {
        if self.restart_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.restart_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_restart_delay.as_secs_f64() {
            return self.max_restart_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> ManagedProcessConfig {
        let mut config = ManagedProcessConfig::new("worker", "worker");
        config.max_consecutive_restarts = 3;
        config.restart_window = Duration::from_secs(60);
        config.restart_delay = Duration::from_secs(1);
        config.backoff_multiplier = 2.0;
        config.max_restart_delay = Duration::from_secs(3);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_failure_ignores_clean_exit() {
        let mut tracker = RestartTracker::new(&create_test_config());
        assert_eq!(
            tracker.on_exit(&ExitInfo::from_code(0)),
            RestartDecision::NotPermitted
        );
        assert_eq!(tracker.consecutive_restarts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_then_storm() {
        let mut tracker = RestartTracker::new(&create_test_config());
        let crash = ExitInfo::from_code(137);

        assert_eq!(
            tracker.on_exit(&crash),
            RestartDecision::Restart {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            tracker.on_exit(&crash),
            RestartDecision::Restart {
                attempt: 2,
                delay: Duration::from_secs(2)
            }
        );
        // capped at max_restart_delay
        assert_eq!(
            tracker.on_exit(&crash),
            RestartDecision::Restart {
                attempt: 3,
                delay: Duration::from_secs(3)
            }
        );
        assert_eq!(
            tracker.on_exit(&crash),
            RestartDecision::StormDetected { restarts: 3 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_count() {
        let mut tracker = RestartTracker::new(&create_test_config());
        let crash = ExitInfo::from_signal(9);

        for _ in 0..3 {
            assert!(matches!(tracker.on_exit(&crash), RestartDecision::Restart { .. }));
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            tracker.on_exit(&crash),
            RestartDecision::Restart {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_restarts_again() {
        let mut tracker = RestartTracker::new(&create_test_config());
        let crash = ExitInfo::from_code(1);
        for _ in 0..3 {
            tracker.on_exit(&crash);
        }
        assert!(matches!(tracker.on_exit(&crash), RestartDecision::StormDetected { .. }));

        tracker.reset();
        assert_eq!(tracker.consecutive_restarts(), 0);
        assert!(matches!(
            tracker.on_exit(&crash),
            RestartDecision::Restart { attempt: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_restarts_immediately() {
        let mut config = create_test_config();
        config.restart_delay = Duration::ZERO;
        config.restart_policy = RestartPolicy::Always;
        let mut tracker = RestartTracker::new(&config);

        assert_eq!(
            tracker.on_exit(&ExitInfo::from_code(0)),
            RestartDecision::Restart {
                attempt: 1,
                delay: Duration::ZERO
            }
        );
    }
}
