//! Health check infrastructure for the orchestrator
//!
//! Components report call outcomes into a [`HealthRegistry`]; a run of
//! consecutive failures moves a component from degraded to unhealthy.
//! Readiness additionally probes each downstream service's `/health`.

use crate::config_store::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Consecutive failures after which a component is reported unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Timeout for a single dependency probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Health after `failures` consecutive failures ending with `message`
    pub fn failing(failures: u32, message: impl Into<String>) -> Self {
        let status = if failures >= UNHEALTHY_AFTER_FAILURES {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        Self {
            status,
            message: Some(message.into()),
            consecutive_failures: failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Component names for health tracking
pub mod components {
    pub const LOG_ANALYZER: &str = "log_analyzer";
    pub const ROOT_CAUSE_PREDICTOR: &str = "root_cause_predictor";
    pub const KNOWLEDGE_BASE: &str = "knowledge_base";
    pub const ACTION_RECOMMENDER: &str = "action_recommender";
    pub const KUBECTL: &str = "kubectl";
    pub const TRACKER: &str = "tracker";

    pub const ALL: &[&str] = &[
        LOG_ANALYZER,
        ROOT_CAUSE_PREDICTOR,
        KNOWLEDGE_BASE,
        ACTION_RECOMMENDER,
        KUBECTL,
        TRACKER,
    ];
}

/// Health registry for tracking component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every orchestrator component registered healthy
    pub async fn with_default_components() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.register(name).await;
        }
        registry
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// A call to `name` succeeded
    pub async fn record_success(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// A call to `name` failed; extends the component's failure streak
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut components = self.components.write().await;
        let failures = components
            .get(name)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
            .saturating_add(1);
        components.insert(name.to_string(), ComponentHealth::failing(failures, message));
    }

    pub async fn get(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }
}

/// Readiness response with per-dependency probe results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub ready: bool,
    /// "ok" or "error: ..." per downstream service
    pub dependencies: BTreeMap<String, String>,
}

/// Derive a service's health URL from one of its endpoints
pub fn health_url(endpoint: &str) -> Option<String> {
    let mut url = url::Url::parse(endpoint).ok()?;
    url.set_path("/health");
    url.set_query(None);
    Some(url.to_string())
}

/// Probes the analysis services' `/health` endpoints
#[derive(Debug, Clone)]
pub struct DependencyProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl DependencyProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe every analysis stage endpoint named in `config`
    pub async fn check(&self, config: &ServiceConfig) -> ReadinessResponse {
        let targets = [
            (components::LOG_ANALYZER, &config.log_analyzer_url),
            (components::ROOT_CAUSE_PREDICTOR, &config.root_cause_predictor_url),
            (components::KNOWLEDGE_BASE, &config.knowledge_base_url),
            (components::ACTION_RECOMMENDER, &config.action_recommender_url),
        ];

        let probes = targets
            .iter()
            .map(|(name, endpoint)| async move { (*name, self.probe(endpoint).await) });
        let results = futures::future::join_all(probes).await;

        let dependencies: BTreeMap<String, String> = results
            .into_iter()
            .map(|(name, status)| (name.to_string(), status))
            .collect();
        let ready = dependencies.values().all(|s| s == "ok");

        ReadinessResponse {
            status: if ready { "ready" } else { "not ready" }.to_string(),
            ready,
            dependencies,
        }
    }

    async fn probe(&self, endpoint: &str) -> String {
        let Some(url) = health_url(endpoint) else {
            return format!("error: invalid endpoint {endpoint}");
        };

        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => "ok".to_string(),
            Ok(resp) => format!("error: {}", resp.status().as_u16()),
            Err(e) => {
                debug!(url = %url, error = %e, "Dependency probe failed");
                format!("error: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_default_components_registered() {
        let registry = HealthRegistry::with_default_components().await;
        let health = registry.health().await;

        for name in components::ALL {
            assert_eq!(health.components[*name].status, ComponentStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_failure_streak_degrades_then_fails() {
        let registry = HealthRegistry::new();
        registry.register(components::KNOWLEDGE_BASE).await;

        registry
            .record_failure(components::KNOWLEDGE_BASE, "timed out")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .record_failure(components::KNOWLEDGE_BASE, "timed out")
            .await;
        registry
            .record_failure(components::KNOWLEDGE_BASE, "connection refused")
            .await;

        let health = registry.get(components::KNOWLEDGE_BASE).await.unwrap();
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(health.message.as_deref(), Some("connection refused"));
        assert!(!health.status.is_operational());
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let registry = HealthRegistry::new();
        registry.record_failure(components::KUBECTL, "timeout").await;
        registry.record_failure(components::KUBECTL, "timeout").await;
        registry.record_success(components::KUBECTL).await;

        let health = registry.get(components::KUBECTL).await.unwrap();
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn test_health_url_replaces_path() {
        assert_eq!(
            health_url("http://log-analyzer:8000/analyze").as_deref(),
            Some("http://log-analyzer:8000/health")
        );
        assert_eq!(
            health_url("https://kb.internal/v1/search?x=1").as_deref(),
            Some("https://kb.internal/health")
        );
        assert!(health_url("not a url").is_none());
    }

    #[tokio::test]
    async fn test_readiness_probe() {
        let mut healthy = mockito::Server::new_async().await;
        let _ok = healthy
            .mock("GET", "/health")
            .with_status(200)
            .expect(3)
            .create_async()
            .await;
        let mut sick = mockito::Server::new_async().await;
        let _down = sick
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        let config = ServiceConfig {
            log_analyzer_url: format!("{}/analyze", healthy.url()),
            root_cause_predictor_url: format!("{}/predict", healthy.url()),
            knowledge_base_url: format!("{}/search", sick.url()),
            action_recommender_url: format!("{}/recommend", healthy.url()),
            ..ServiceConfig::default()
        };

        let readiness = DependencyProbe::new(reqwest::Client::new())
            .check(&config)
            .await;

        assert!(!readiness.ready);
        assert_eq!(readiness.status, "not ready");
        assert_eq!(readiness.dependencies[components::LOG_ANALYZER], "ok");
        assert_eq!(readiness.dependencies[components::KNOWLEDGE_BASE], "error: 503");
    }
}
