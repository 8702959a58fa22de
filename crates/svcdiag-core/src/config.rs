//! Explicit configuration values handed to the collector and the checks.

use std::time::Duration;

use crate::error::DiagError;
use crate::retry::RetryPolicy;

/// Stream files downloaded from every task sandbox (with rotated variants).
pub const DEFAULT_DOWNLOAD_PATTERNS: &[&str] = &[r"^stdout(\.\d+)?$", r"^stderr(\.\d+)?$"];

/// Which service to collect and how.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleConfig {
    pub package_name: String,
    pub service_name: String,
    /// Install the package's CLI subcommand before collecting.
    pub install_cli: bool,
    /// Regexes matched against file base names in each sandbox.
    pub download_patterns: Vec<String>,
    pub snapshot_retry: RetryPolicy,
}

impl BundleConfig {
    pub fn new(package_name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            service_name: service_name.into(),
            install_cli: true,
            download_patterns: DEFAULT_DOWNLOAD_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            snapshot_retry: RetryPolicy::snapshot(),
        }
    }

    pub fn validate(&self) -> Result<(), DiagError> {
        require_name("package name", &self.package_name)?;
        require_name("service name", &self.service_name)?;
        if self.download_patterns.is_empty() {
            return Err(DiagError::InvalidConfig(
                "at least one download pattern is required".into(),
            ));
        }
        Ok(())
    }
}

/// Expected shape of a Kafka deployment under test.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConfig {
    pub package_name: String,
    pub service_name: String,
    pub broker_count: usize,
    /// Pods are named `<pod_type>-<index>`, brokers `<pod>-broker`.
    pub pod_type: String,
    pub broker_poll: RetryPolicy,
    pub topic_wait: RetryPolicy,
    pub task_convergence: RetryPolicy,
}

impl KafkaConfig {
    pub fn new(package_name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            service_name: service_name.into(),
            broker_count: 3,
            pod_type: "kafka".to_string(),
            broker_poll: RetryPolicy::broker_poll(),
            topic_wait: RetryPolicy::topic_wait(),
            task_convergence: RetryPolicy::task_convergence(),
        }
    }

    pub fn validate(&self) -> Result<(), DiagError> {
        require_name("package name", &self.package_name)?;
        require_name("service name", &self.service_name)?;
        require_name("pod type", &self.pod_type)?;
        if self.broker_count == 0 {
            return Err(DiagError::InvalidConfig("broker count must be positive".into()));
        }
        Ok(())
    }
}

/// How to reach the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// CLI binary invoked for every command.
    pub cli_program: String,
    /// Base URL for agent file endpoints; required to download logs.
    pub cluster_url: Option<String>,
    pub auth_token: Option<String>,
    pub command_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cli_program: "dcos".to_string(),
            cluster_url: None,
            auth_token: None,
            command_timeout: Duration::from_secs(120),
        }
    }
}

fn require_name(what: &str, value: &str) -> Result<(), DiagError> {
    if value.trim().is_empty() {
        return Err(DiagError::InvalidConfig(format!("{what} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_download_stream_files() {
        let cfg = BundleConfig::new("kafka", "kafka");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.download_patterns.len(), 2);
        assert!(cfg.install_cli);
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let cfg = BundleConfig::new("kafka", " ");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("service name"));
    }

    #[test]
    fn kafka_defaults_match_the_standard_deployment() {
        let cfg = KafkaConfig::new("kafka", "kafka");
        assert_eq!(cfg.broker_count, 3);
        assert_eq!(cfg.pod_type, "kafka");
        assert!(cfg.validate().is_ok());

        let zero = KafkaConfig {
            broker_count: 0,
            ..cfg
        };
        assert!(zero.validate().is_err());
    }
}
