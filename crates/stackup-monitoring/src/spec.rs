//! Health check specifications.

use crate::{HealthCheckError, HealthCheckResult};
use serde::{Deserialize, Serialize};
use stackup_common::duration::serde_duration;
use std::fmt;
use std::time::Duration;

/// How readiness of a dependency group is probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Targets probed concurrently on every attempt; all must be healthy.
    pub targets: Vec<HealthTarget>,

    /// Upper bound for one attempt against one target.
    #[serde(
        with = "serde_duration",
        alias = "single_attempt_timeout_seconds",
        default = "default_single_attempt_timeout"
    )]
    pub single_attempt_timeout: Duration,

    /// Delay between the end of one attempt and the start of the next.
    #[serde(
        with = "serde_duration",
        alias = "poll_interval_seconds",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_single_attempt_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_attempts() -> u32 {
    30
}

impl HealthCheckSpec {
    pub fn new(targets: Vec<HealthTarget>) -> Self {
        Self {
            targets,
            single_attempt_timeout: default_single_attempt_timeout(),
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }

    pub fn with_timing(
        mut self,
        single_attempt_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        self.single_attempt_timeout = single_attempt_timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Longest time polling this spec can take.
    /// Upper bound on the time a poll of this spec can take, saturating at
    /// `Duration::MAX`.
    pub fn max_wait(&self) -> Duration {
        self.single_attempt_timeout
            .checked_add(self.poll_interval)
            .and_then(|per_attempt| per_attempt.checked_mul(self.max_attempts))
            .unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> HealthCheckResult<()> {
        if self.targets.is_empty() {
            return Err(invalid("at least one target is required"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if self.single_attempt_timeout.is_zero() {
            return Err(invalid("single_attempt_timeout must be greater than zero"));
        }
        if self.single_attempt_timeout >= self.poll_interval {
            return Err(invalid(format!(
                "single_attempt_timeout ({:?}) must be shorter than poll_interval ({:?})",
                self.single_attempt_timeout, self.poll_interval
            )));
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> HealthCheckError {
    HealthCheckError::InvalidSpec {
        reason: reason.into(),
    }
}

/// A single health contract and its success criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthTarget {
    /// GET `url`; healthy when the status is listed and the body matches.
    Http {
        url: String,
        #[serde(default = "default_expected_status")]
        expected_status: Vec<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body_contains: Option<String>,
    },
    /// Healthy when a TCP connection to `address` is accepted.
    Tcp { address: String },
    /// Healthy when the command exits with status 0.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Healthy while the named managed process is running.
    Process { name: String },
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

impl HealthTarget {
    pub fn http(url: impl Into<String>) -> Self {
        HealthTarget::Http {
            url: url.into(),
            expected_status: default_expected_status(),
            body_contains: None,
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        HealthTarget::Tcp {
            address: address.into(),
        }
    }

    pub fn process(name: impl Into<String>) -> Self {
        HealthTarget::Process { name: name.into() }
    }

    fn validate(&self) -> HealthCheckResult<()> {
        let target = self.to_string();
        let reject = |reason: &str| HealthCheckError::InvalidTarget {
            target: target.clone(),
            reason: reason.to_string(),
        };

        match self {
            HealthTarget::Http {
                url,
                expected_status,
                ..
            } => {
                if !url.starts_with("http://") {
                    return Err(reject("only http:// URLs are supported"));
                }
                if expected_status.is_empty() {
                    return Err(reject("expected_status cannot be empty"));
                }
            }
            HealthTarget::Tcp { address } if address.trim().is_empty() => {
                return Err(reject("address cannot be empty"));
            }
            HealthTarget::Command { command, .. } if command.trim().is_empty() => {
                return Err(reject("command cannot be empty"));
            }
            HealthTarget::Process { name } if name.trim().is_empty() => {
                return Err(reject("process name cannot be empty"));
            }
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for HealthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthTarget::Http { url, .. } => write!(f, "http {}", url),
            HealthTarget::Tcp { address } => write!(f, "tcp {}", address),
            HealthTarget::Command { command, args } => {
                write!(f, "command {}", command)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            HealthTarget::Process { name } => write!(f, "process {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec_with_aliases() {
        let yaml = r#"
targets:
  - type: http
    url: http://127.0.0.1:8000/health
  - type: tcp
    address: 127.0.0.1:6379
poll_interval_seconds: 2
single_attempt_timeout_seconds: 1
max_attempts: 5
"#;
        let spec: HealthCheckSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.poll_interval, Duration::from_secs(2));
        assert_eq!(spec.single_attempt_timeout, Duration::from_secs(1));
        assert_eq!(spec.max_attempts, 5);
        assert_eq!(
            spec.targets[0],
            HealthTarget::http("http://127.0.0.1:8000/health")
        );
        assert!(spec.validate().is_ok());
        assert_eq!(spec.max_wait(), Duration::from_secs(15));
    }

    #[test]
    fn test_max_wait_saturates() {
        let spec = HealthCheckSpec::new(vec![HealthTarget::tcp("127.0.0.1:1")])
            .with_timing(Duration::from_secs(1), Duration::MAX)
            .with_max_attempts(u32::MAX);
        assert_eq!(spec.max_wait(), Duration::MAX);

        let spec = spec.with_timing(Duration::from_secs(1), Duration::from_secs(u64::MAX / 2));
        assert_eq!(spec.max_wait(), Duration::MAX);
    }

    #[test]
    fn test_timeout_must_be_shorter_than_interval() {
        let spec = HealthCheckSpec::new(vec![HealthTarget::tcp("127.0.0.1:1")])
            .with_timing(Duration::from_secs(2), Duration::from_secs(2));
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("must be shorter than poll_interval"));
    }

    #[test]
    fn test_rejects_empty_and_invalid_targets() {
        assert!(HealthCheckSpec::new(vec![]).validate().is_err());
        assert!(HealthCheckSpec::new(vec![HealthTarget::http("https://example.com")])
            .validate()
            .is_err());
        assert!(HealthCheckSpec::new(vec![HealthTarget::tcp("127.0.0.1:1")])
            .with_max_attempts(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_target_display() {
        let target = HealthTarget::Command {
            command: "pg_isready".to_string(),
            args: vec!["-h".to_string(), "db".to_string()],
        };
        assert_eq!(target.to_string(), "command pg_isready -h db");
        assert_eq!(HealthTarget::process("worker").to_string(), "process worker");
    }
}
