//! Stack configuration: supervisor options, managed processes, external
//! services and the ordered dependency groups.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use stackup_common::duration::serde_duration;
use stackup_monitoring::{HealthCheckSpec, HealthTarget};
use stackup_supervisor::{ManagedProcessConfig, SupervisorConfig, SupervisorOptions};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub processes: Vec<ManagedProcessConfig>,
    #[serde(default)]
    pub external_services: Vec<ExternalService>,
    /// Brought up in this order.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// A collaborator outside the supervisor, e.g. a database container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalService {
    pub name: String,
    /// Program and arguments run once to start the service; when unset the
    /// service is expected to be started by someone else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<Vec<String>>,
    #[serde(with = "serde_duration", default = "default_start_timeout")]
    pub start_timeout: Duration,
}

impl ExternalService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_command: None,
            start_timeout: default_start_timeout(),
        }
    }

    pub fn with_start_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_command = Some(argv.into_iter().map(Into::into).collect());
        self
    }
}

/// Members released together once their health check passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Managed process and external service names.
    pub members: Vec<String>,
    /// Launch the members but do not wait for them.
    #[serde(default)]
    pub skip: bool,
    /// Without a health check the group is released right after launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

impl GroupConfig {
    pub fn new<I, S>(name: impl Into<String>, members: I, health_check: HealthCheckSpec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            skip: false,
            health_check: Some(health_check),
        }
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// The health check to poll, or `None` when the group is not gated.
    pub fn gate(&self) -> Option<&HealthCheckSpec> {
        if self.skip {
            None
        } else {
            self.health_check.as_ref()
        }
    }
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(60)
}

impl StackConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;

        Self::load_from_string(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: StackConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            supervisor: self.supervisor.clone(),
            processes: self.processes.clone(),
        }
    }

    /// Managed processes that belong to no group, in configuration order.
    pub fn ungrouped_processes(&self) -> Vec<String> {
        let grouped: HashSet<&str> = self
            .groups
            .iter()
            .flat_map(|group| group.members.iter().map(String::as_str))
            .collect();
        self.processes
            .iter()
            .filter(|process| !grouped.contains(process.name.as_str()))
            .map(|process| process.name.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.supervisor_config().validate()?;

        let processes: HashSet<&str> = self.processes.iter().map(|p| p.name.as_str()).collect();
        let mut externals = HashSet::new();
        for service in &self.external_services {
            validate_external_service(service)?;
            if processes.contains(service.name.as_str()) {
                return Err(anyhow!(
                    "External service {} has the same name as a managed process",
                    service.name
                ));
            }
            if !externals.insert(service.name.as_str()) {
                return Err(anyhow!("Duplicate external service name: {}", service.name));
            }
        }

        let mut group_names = HashSet::new();
        let mut grouped = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(anyhow!("Group name cannot be empty"));
            }
            if !group_names.insert(group.name.as_str()) {
                return Err(anyhow!("Duplicate group name: {}", group.name));
            }
            if group.members.is_empty() {
                return Err(anyhow!("Group {} has no members", group.name));
            }

            for member in &group.members {
                if !processes.contains(member.as_str()) && !externals.contains(member.as_str()) {
                    return Err(anyhow!(
                        "Group {}: unknown member '{}' (not a process or external service)",
                        group.name,
                        member
                    ));
                }
                if !grouped.insert(member.as_str()) {
                    return Err(anyhow!(
                        "Group {}: member '{}' already belongs to an earlier group",
                        group.name,
                        member
                    ));
                }
            }

            if let Some(ref spec) = group.health_check {
                validate_health_check(&group.name, spec, &processes)?;
            }
        }

        Ok(())
    }
}

fn validate_external_service(service: &ExternalService) -> Result<()> {
    if service.name.trim().is_empty() {
        return Err(anyhow!("External service name cannot be empty"));
    }

    if let Some(ref argv) = service.start_command {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => {
                return Err(anyhow!(
                    "External service {}: start_command cannot be empty",
                    service.name
                ))
            }
        }
        if service.start_timeout.is_zero() {
            return Err(anyhow!(
                "External service {}: start_timeout must be greater than 0",
                service.name
            ));
        }
    }

    Ok(())
}

fn validate_health_check(
    group: &str,
    spec: &HealthCheckSpec,
    processes: &HashSet<&str>,
) -> Result<()> {
    spec.validate()
        .with_context(|| format!("Group {}: invalid health_check", group))?;

    for target in &spec.targets {
        if let HealthTarget::Process { name } = target {
            if !processes.contains(name.as_str()) {
                return Err(anyhow!(
                    "Group {}: process target '{}' is not a managed process",
                    group,
                    name
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
supervisor:
  log_tail_lines: 100
processes:
  - name: cache
    command: redis-server
    priority: 10
  - name: api
    command: ./api
    priority: 20
    restart_policy: Always
external_services:
  - name: postgres
    start_command: ["docker", "start", "pg"]
    start_timeout: 30s
groups:
  - name: storage
    members: [postgres, cache]
    health_check:
      targets:
        - type: tcp
          address: 127.0.0.1:5432
        - type: tcp
          address: 127.0.0.1:6379
      single_attempt_timeout_seconds: 1
      poll_interval_seconds: 2
      max_attempts: 5
  - name: app
    members: [api]
    health_check:
      targets:
        - type: http
          url: http://127.0.0.1:8080/health
        - type: process
          name: api
      single_attempt_timeout: 500ms
      poll_interval: 1s
"#;

    #[test]
    fn test_load_stack() {
        let config = StackConfig::load_from_string(STACK).unwrap();
        assert_eq!(config.processes.len(), 2);
        assert_eq!(config.groups.len(), 2);

        let storage = &config.groups[0];
        assert_eq!(storage.members, vec!["postgres", "cache"]);
        let spec = storage.gate().unwrap();
        assert_eq!(spec.max_attempts, 5);
        assert_eq!(spec.poll_interval, Duration::from_secs(2));

        let app = &config.groups[1];
        let spec = app.gate().unwrap();
        assert_eq!(spec.single_attempt_timeout, Duration::from_millis(500));
        assert_eq!(spec.max_attempts, 30);

        let postgres = &config.external_services[0];
        assert_eq!(postgres.start_timeout, Duration::from_secs(30));
        assert_eq!(
            postgres.start_command.as_deref().unwrap(),
            ["docker", "start", "pg"]
        );
    }

    #[test]
    fn test_ungrouped_processes() {
        let mut config = StackConfig::load_from_string(STACK).unwrap();
        assert!(config.ungrouped_processes().is_empty());

        config.groups.remove(1);
        assert_eq!(config.ungrouped_processes(), vec!["api"]);
        config.groups.clear();
        assert_eq!(config.ungrouped_processes(), vec!["cache", "api"]);
    }

    #[test]
    fn test_unknown_member_rejected() {
        let yaml = r#"
processes:
  - name: api
    command: ./api
groups:
  - name: app
    members: [api, worker]
"#;
        let error = StackConfig::load_from_string(yaml).unwrap_err();
        assert!(format!("{:#}", error).contains("unknown member 'worker'"));
    }

    #[test]
    fn test_timeout_must_be_shorter_than_interval() {
        let yaml = r#"
processes:
  - name: api
    command: ./api
groups:
  - name: app
    members: [api]
    health_check:
      targets:
        - type: tcp
          address: 127.0.0.1:8080
      single_attempt_timeout: 2s
      poll_interval: 2s
"#;
        let error = StackConfig::load_from_string(yaml).unwrap_err();
        assert!(format!("{:#}", error).contains("must be shorter than poll_interval"));
    }

    #[test]
    fn test_member_in_two_groups_rejected() {
        let yaml = r#"
processes:
  - name: api
    command: ./api
groups:
  - name: first
    members: [api]
  - name: second
    members: [api]
"#;
        assert!(StackConfig::load_from_string(yaml).is_err());
    }

    #[test]
    fn test_process_target_must_be_managed() {
        let yaml = r#"
processes:
  - name: api
    command: ./api
groups:
  - name: app
    members: [api]
    health_check:
      targets:
        - type: process
          name: worker
"#;
        let error = StackConfig::load_from_string(yaml).unwrap_err();
        assert!(format!("{:#}", error).contains("not a managed process"));
    }

    #[test]
    fn test_skipped_group_has_no_gate() {
        let group = GroupConfig::new(
            "tools",
            ["api"],
            HealthCheckSpec::new(vec![HealthTarget::tcp("127.0.0.1:1")]),
        )
        .skipped();
        assert!(group.gate().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = StackConfig::load_from_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(error.to_string().contains("Failed to read config file"));
    }
}
