//! Tracker, code-host and chat credentials

use crate::config_store::ServiceConfig;
use crate::error::{OrchestratorError, Result};

/// Integration credentials, environment first, config store second
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationSettings {
    pub jira_server: String,
    pub jira_user: String,
    pub jira_token: String,
    pub jira_project: String,
    pub github_token: String,
    pub github_repo: String,
    pub webhook_secret: String,
    pub slack_webhook_url: String,
}

impl IntegrationSettings {
    /// Resolve from the process environment and `config`
    pub fn resolve(config: &ServiceConfig) -> Self {
        Self::resolve_with(|key| std::env::var(key).ok(), config)
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve_with(env: impl Fn(&str) -> Option<String>, config: &ServiceConfig) -> Self {
        let pick = |key: &str, fallback: &str| {
            env(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            jira_server: pick("JIRA_SERVER", &config.jira_server),
            jira_user: pick("JIRA_USER", &config.jira_user),
            jira_token: pick("JIRA_TOKEN", &config.jira_token),
            jira_project: pick("JIRA_PROJECT", &config.jira_project),
            github_token: pick("GITHUB_TOKEN", &config.github_token),
            github_repo: pick("GITHUB_REPO", &config.github_repo),
            webhook_secret: pick("WEBHOOK_SECRET", &config.webhook_secret),
            slack_webhook_url: pick("SLACK_WEBHOOK_URL", &config.slack_webhook_url),
        }
    }

    pub fn has_code_host(&self) -> bool {
        !self.github_token.is_empty() && !self.github_repo.is_empty()
    }
}

/// Fail with a configuration error naming `key` when `value` is empty
pub fn require<'a>(key: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(OrchestratorError::missing_setting(key))
    } else {
        Ok(value)
    }
}
