//! Orchestrator bootstrap configuration

use anyhow::{Context, Result};
use orchestrator_lib::collector::NamespaceFailurePolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level settings read from `ORCH_*` environment variables
///
/// Downstream URLs and integration secrets live in the runtime config store
/// instead, so they can change without a restart.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON file backing the runtime config store
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Admitted requests per client per period
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,

    #[serde(default = "default_rate_period")]
    pub rate_period_secs: u64,

    /// Timeout of each analysis stage call
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_escalation_timeout")]
    pub escalation_timeout_secs: u64,

    #[serde(default = "default_kubectl_timeout")]
    pub kubectl_timeout_secs: u64,

    /// Pods whose logs are fetched at once
    #[serde(default = "default_pod_concurrency")]
    pub pod_concurrency: usize,

    #[serde(default)]
    pub namespace_policy: NamespaceFailurePolicy,

    /// Finished jobs are kept this long; 0 keeps them until restart
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "incident-orchestrator".to_string())
}

fn default_port() -> u16 {
    8000
}

fn default_config_path() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_rate_limit() -> usize {
    5
}

fn default_rate_period() -> u64 {
    60
}

fn default_stage_timeout() -> u64 {
    30
}

fn default_escalation_timeout() -> u64 {
    15
}

fn default_kubectl_timeout() -> u64 {
    30
}

fn default_pod_concurrency() -> usize {
    8
}

fn default_job_retention() -> u64 {
    3600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            port: default_port(),
            config_path: default_config_path(),
            rate_limit: default_rate_limit(),
            rate_period_secs: default_rate_period(),
            stage_timeout_secs: default_stage_timeout(),
            escalation_timeout_secs: default_escalation_timeout(),
            kubectl_timeout_secs: default_kubectl_timeout(),
            pod_concurrency: default_pod_concurrency(),
            namespace_policy: NamespaceFailurePolicy::default(),
            job_retention_secs: default_job_retention(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ORCH").try_parsing(true))
            .build()
            .context("failed to read ORCH_* environment")?;

        config
            .try_deserialize()
            .context("invalid ORCH_* configuration")
    }

    pub fn rate_period(&self) -> Duration {
        Duration::from_secs(self.rate_period_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_secs(self.escalation_timeout_secs)
    }

    pub fn kubectl_timeout(&self) -> Duration {
        Duration::from_secs(self.kubectl_timeout_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }
}
