//! File-backed runtime configuration
//!
//! The store keeps a cached copy of the configuration file together with the
//! file's modification time. The cache is valid iff the recorded mtime equals
//! the file's current mtime; every read re-checks this before returning.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Substrings that mark a key as secret-bearing
pub const SECRET_KEY_MARKERS: &[&str] = &["TOKEN", "SECRET", "PASSWORD", "WEBHOOK"];

/// Replacement for secret values in masked reads
pub const REDACTED: &str = "****";

/// Runtime configuration: downstream endpoints, feature flags and
/// integration credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    #[serde(rename = "LOG_ANALYZER_URL")]
    pub log_analyzer_url: String,
    #[serde(rename = "ROOT_CAUSE_PREDICTOR_URL")]
    pub root_cause_predictor_url: String,
    #[serde(rename = "KNOWLEDGE_BASE_URL")]
    pub knowledge_base_url: String,
    #[serde(rename = "ACTION_RECOMMENDER_URL")]
    pub action_recommender_url: String,
    /// Remote incident integrator; empty means tickets are handled in-process
    #[serde(rename = "INCIDENT_INTEGRATOR_URL")]
    pub incident_integrator_url: String,
    #[serde(rename = "ENABLE_INCIDENT_INTEGRATION")]
    pub enable_incident_integration: bool,
    #[serde(rename = "JIRA_SERVER")]
    pub jira_server: String,
    #[serde(rename = "JIRA_USER")]
    pub jira_user: String,
    #[serde(rename = "JIRA_TOKEN")]
    pub jira_token: String,
    #[serde(rename = "JIRA_PROJECT")]
    pub jira_project: String,
    #[serde(rename = "GITHUB_TOKEN")]
    pub github_token: String,
    #[serde(rename = "GITHUB_REPO")]
    pub github_repo: String,
    #[serde(rename = "WEBHOOK_SECRET")]
    pub webhook_secret: String,
    #[serde(rename = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_analyzer_url: "http://log-analyzer:8000/analyze".to_string(),
            root_cause_predictor_url: "http://root-cause-predictor:8000/predict".to_string(),
            knowledge_base_url: "http://knowledge-base:8000/search".to_string(),
            action_recommender_url: "http://action-recommender:8000/recommend".to_string(),
            incident_integrator_url: String::new(),
            enable_incident_integration: true,
            jira_server: String::new(),
            jira_user: String::new(),
            jira_token: String::new(),
            jira_project: String::new(),
            github_token: String::new(),
            github_repo: String::new(),
            webhook_secret: String::new(),
            slack_webhook_url: String::new(),
        }
    }
}

/// Partial update. Only recognised keys deserialize; anything else in the
/// incoming document is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    #[serde(rename = "LOG_ANALYZER_URL")]
    pub log_analyzer_url: Option<String>,
    #[serde(rename = "ROOT_CAUSE_PREDICTOR_URL")]
    pub root_cause_predictor_url: Option<String>,
    #[serde(rename = "KNOWLEDGE_BASE_URL")]
    pub knowledge_base_url: Option<String>,
    #[serde(rename = "ACTION_RECOMMENDER_URL")]
    pub action_recommender_url: Option<String>,
    #[serde(rename = "INCIDENT_INTEGRATOR_URL")]
    pub incident_integrator_url: Option<String>,
    #[serde(rename = "ENABLE_INCIDENT_INTEGRATION")]
    pub enable_incident_integration: Option<bool>,
    #[serde(rename = "JIRA_SERVER")]
    pub jira_server: Option<String>,
    #[serde(rename = "JIRA_USER")]
    pub jira_user: Option<String>,
    #[serde(rename = "JIRA_TOKEN")]
    pub jira_token: Option<String>,
    #[serde(rename = "JIRA_PROJECT")]
    pub jira_project: Option<String>,
    #[serde(rename = "GITHUB_TOKEN")]
    pub github_token: Option<String>,
    #[serde(rename = "GITHUB_REPO")]
    pub github_repo: Option<String>,
    #[serde(rename = "WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,
    #[serde(rename = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: Option<String>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.changed_keys().is_empty()
    }

    /// Names of the keys this patch sets
    pub fn changed_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        macro_rules! collect {
            ($($field:ident => $key:literal),* $(,)?) => {
                $( if self.$field.is_some() { keys.push($key); } )*
            };
        }
        collect!(
            log_analyzer_url => "LOG_ANALYZER_URL",
            root_cause_predictor_url => "ROOT_CAUSE_PREDICTOR_URL",
            knowledge_base_url => "KNOWLEDGE_BASE_URL",
            action_recommender_url => "ACTION_RECOMMENDER_URL",
            incident_integrator_url => "INCIDENT_INTEGRATOR_URL",
            enable_incident_integration => "ENABLE_INCIDENT_INTEGRATION",
            jira_server => "JIRA_SERVER",
            jira_user => "JIRA_USER",
            jira_token => "JIRA_TOKEN",
            jira_project => "JIRA_PROJECT",
            github_token => "GITHUB_TOKEN",
            github_repo => "GITHUB_REPO",
            webhook_secret => "WEBHOOK_SECRET",
            slack_webhook_url => "SLACK_WEBHOOK_URL",
        );
        keys
    }

    /// Merge the set keys into `config`
    pub fn apply(self, config: &mut ServiceConfig) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $( if let Some(value) = self.$field { config.$field = value; } )*
            };
        }
        merge!(
            log_analyzer_url,
            root_cause_predictor_url,
            knowledge_base_url,
            action_recommender_url,
            incident_integrator_url,
            enable_incident_integration,
            jira_server,
            jira_user,
            jira_token,
            jira_project,
            github_token,
            github_repo,
            webhook_secret,
            slack_webhook_url,
        );
    }
}

/// Returns true if the key name marks a secret value
pub fn is_secret_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SECRET_KEY_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Render a config with secret-like values redacted.
pub fn mask_secrets(config: &ServiceConfig) -> Map<String, Value> {
    let mut masked = match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    for (key, value) in masked.iter_mut() {
        if !is_secret_key(key) {
            continue;
        }
        let present = match value {
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            _ => true,
        };
        *value = Value::String(if present { REDACTED } else { "" }.to_string());
    }

    masked
}

#[derive(Debug)]
struct CachedConfig {
    config: ServiceConfig,
    mtime: SystemTime,
}

/// Config store backed by a JSON file
pub struct ConfigStore {
    path: PathBuf,
    cache: Mutex<Option<CachedConfig>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration, reloading only when the file changed
    pub fn get(&self) -> ServiceConfig {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.load_locked(&mut cache) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to load config, using defaults");
                ServiceConfig::default()
            }
        }
    }

    /// Current configuration with secrets redacted
    pub fn masked(&self) -> Map<String, Value> {
        mask_secrets(&self.get())
    }

    /// Merge `patch` into the stored configuration and persist it
    pub fn update(&self, patch: ConfigPatch) -> Result<ServiceConfig> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // A corrupt file is repaired by writing the patch over defaults
        let mut config = match self.load_locked(&mut cache) {
            Ok(config) => config,
            Err(OrchestratorError::Json(e)) => {
                warn!(path = %self.path.display(), error = %e, "Config file unparsable, patching defaults");
                ServiceConfig::default()
            }
            Err(e) => return Err(e),
        };
        let keys = patch.changed_keys();
        patch.apply(&mut config);

        self.write_atomic(&config)?;
        let mtime = self.current_mtime()?;
        *cache = Some(CachedConfig {
            config: config.clone(),
            mtime,
        });

        info!(path = %self.path.display(), keys = ?keys, "Configuration updated");
        Ok(config)
    }

    /// Load through the cache. Caller holds the store lock.
    fn load_locked(&self, cache: &mut Option<CachedConfig>) -> Result<ServiceConfig> {
        let mtime = match self.current_mtime() {
            Ok(mtime) => mtime,
            Err(OrchestratorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Config file missing, writing defaults");
                let config = ServiceConfig::default();
                self.write_atomic(&config)?;
                let mtime = self.current_mtime()?;
                *cache = Some(CachedConfig {
                    config: config.clone(),
                    mtime,
                });
                return Ok(config);
            }
            Err(e) => return Err(e),
        };

        if let Some(cached) = cache.as_ref() {
            if cached.mtime == mtime {
                return Ok(cached.config.clone());
            }
        }

        debug!(path = %self.path.display(), "Config file changed, reloading");
        let content = fs::read_to_string(&self.path)?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        *cache = Some(CachedConfig {
            config: config.clone(),
            mtime,
        });
        Ok(config)
    }

    fn current_mtime(&self) -> Result<SystemTime> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    /// Write to a sibling temp file, then rename over the target
    fn write_atomic(&self, config: &ServiceConfig) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        let content = serde_json::to_string_pretty(config)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| OrchestratorError::Io(e.error))?;
        Ok(())
    }
}
