//! Core data models for the incident orchestrator

use crate::error::{OrchestratorError, Result};
use crate::pipeline::{AnalysisOutcome, StageOutcome};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_NAMESPACES: usize = 10;
pub const MAX_LINES_PER_POD: u32 = 2000;
pub const MAX_TIME_RANGE_MINUTES: u32 = 1440;
pub const MAX_SEARCH_PATTERNS: usize = 10;
pub const MAX_PATTERN_LENGTH: usize = 100;

/// Managed Kubernetes flavour of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Eks,
    Gke,
}

/// Cluster to scan and how to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    /// Base64-encoded kubeconfig; ambient credentials when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_url: Option<String>,
}

fn default_namespaces() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_time_range() -> u32 {
    60
}

fn default_log_levels() -> Vec<String> {
    vec!["ERROR".to_string(), "WARN".to_string(), "CRITICAL".to_string()]
}

fn default_max_lines() -> u32 {
    1000
}

/// A log scan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub cluster_config: ClusterTarget,
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub pod_labels: Option<BTreeMap<String, String>>,
    #[serde(default = "default_time_range")]
    pub time_range_minutes: u32,
    #[serde(default = "default_log_levels")]
    pub log_levels: Vec<String>,
    #[serde(default)]
    pub search_patterns: Option<Vec<String>>,
    #[serde(default = "default_max_lines")]
    pub max_lines_per_pod: u32,
}

impl ScanRequest {
    /// Create a request with default scope for the given cluster
    pub fn for_cluster(cluster_config: ClusterTarget) -> Self {
        Self {
            cluster_config,
            namespaces: default_namespaces(),
            pod_labels: None,
            time_range_minutes: default_time_range(),
            log_levels: default_log_levels(),
            search_patterns: None,
            max_lines_per_pod: default_max_lines(),
        }
    }

    /// Check every bound. Runs before any credential, process or network use.
    pub fn validate(&self) -> Result<()> {
        if self.namespaces.len() > MAX_NAMESPACES {
            return Err(OrchestratorError::Validation(format!(
                "too many namespaces (max {MAX_NAMESPACES})"
            )));
        }
        if self.max_lines_per_pod > MAX_LINES_PER_POD {
            return Err(OrchestratorError::Validation(format!(
                "max_lines_per_pod exceeds limit ({MAX_LINES_PER_POD})"
            )));
        }
        if self.time_range_minutes > MAX_TIME_RANGE_MINUTES {
            return Err(OrchestratorError::Validation(format!(
                "time_range_minutes exceeds limit ({MAX_TIME_RANGE_MINUTES})"
            )));
        }
        if let Some(patterns) = &self.search_patterns {
            if patterns.len() > MAX_SEARCH_PATTERNS {
                return Err(OrchestratorError::Validation(format!(
                    "too many search patterns (max {MAX_SEARCH_PATTERNS})"
                )));
            }
            if patterns.iter().any(|p| p.chars().count() > MAX_PATTERN_LENGTH) {
                return Err(OrchestratorError::Validation(format!(
                    "search pattern too long (max {MAX_PATTERN_LENGTH} chars)"
                )));
            }
        }
        if self.cluster_config.name.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "cluster_config.name must not be empty".to_string(),
            ));
        }
        if let Some(encoded) = &self.cluster_config.kubeconfig {
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    OrchestratorError::Validation(format!("kubeconfig is not valid base64: {e}"))
                })?;
        }
        Ok(())
    }
}

/// A running pod selected for log collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a scan, returned synchronously or through a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub cluster_name: String,
    pub total_logs: usize,
    pub logs: Vec<String>,
    /// Pods that contributed at least one line, in discovery order
    pub pods_scanned: Vec<String>,
    pub scan_time: String,
    pub errors: Vec<String>,
    pub incident_analysis: Option<AnalysisOutcome>,
    pub incident_integration: Option<StageOutcome<IncidentOutcome>>,
}

/// Escalation payload for a critical incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub error_summary: String,
    #[serde(default)]
    pub error_details: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub line_number: u32,
}

impl IncidentEvent {
    pub fn new(error_summary: impl Into<String>, error_details: impl Into<String>) -> Self {
        Self {
            error_summary: error_summary.into(),
            error_details: error_details.into(),
            file_path: String::new(),
            line_number: 0,
        }
    }
}

/// Status reported for a ticket that was already open
pub const ALREADY_EXISTS: &str = "already exists";

/// Outcome of escalating an incident to the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentOutcome {
    #[serde(rename = "jira_issue", alias = "ticket_key")]
    pub ticket_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl IncidentOutcome {
    pub fn created(ticket_key: impl Into<String>, assigned_to: Option<String>) -> Self {
        Self {
            ticket_key: ticket_key.into(),
            assigned_to,
            status: None,
        }
    }

    pub fn deduplicated(ticket_key: impl Into<String>) -> Self {
        Self {
            ticket_key: ticket_key.into(),
            assigned_to: None,
            status: Some(ALREADY_EXISTS.to_string()),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.status.as_deref() == Some(ALREADY_EXISTS)
    }
}

/// Acknowledgement body for webhook receipt and config updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ClusterTarget {
        ClusterTarget {
            name: "prod-eu".to_string(),
            cluster_type: ClusterType::Eks,
            kubeconfig: None,
            context: None,
            cluster_url: None,
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: ScanRequest = serde_json::from_value(serde_json::json!({
            "cluster_config": {"name": "prod-eu", "type": "gke"}
        }))
        .unwrap();

        assert_eq!(request.namespaces, vec!["default"]);
        assert_eq!(request.time_range_minutes, 60);
        assert_eq!(request.log_levels, vec!["ERROR", "WARN", "CRITICAL"]);
        assert_eq!(request.max_lines_per_pod, 1000);
        assert_eq!(request.cluster_config.cluster_type, ClusterType::Gke);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let mut request = ScanRequest::for_cluster(target());
        request.namespaces = (0..11).map(|i| format!("ns-{i}")).collect();
        assert!(matches!(request.validate(), Err(OrchestratorError::Validation(_))));

        let mut request = ScanRequest::for_cluster(target());
        request.namespaces = (0..10).map(|i| format!("ns-{i}")).collect();
        request.max_lines_per_pod = 2000;
        request.time_range_minutes = 1440;
        assert!(request.validate().is_ok());

        request.max_lines_per_pod = 2001;
        assert!(request.validate().is_err());

        let mut request = ScanRequest::for_cluster(target());
        request.time_range_minutes = 1441;
        assert!(request.validate().is_err());

        let mut request = ScanRequest::for_cluster(target());
        request.search_patterns = Some(vec!["x".repeat(101)]);
        assert!(request.validate().is_err());

        request.search_patterns = Some(vec!["oom".to_string(); 11]);
        assert!(request.validate().is_err());

        request.search_patterns = Some(vec!["y".repeat(100); 10]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_invalid_kubeconfig_rejected() {
        let mut cluster = target();
        cluster.kubeconfig = Some("not base64!!".to_string());
        let request = ScanRequest::for_cluster(cluster);
        assert!(matches!(request.validate(), Err(OrchestratorError::Validation(_))));
    }

    #[test]
    fn test_incident_outcome_wire_shape() {
        let created = IncidentOutcome::created("OPS-12", Some("alice".to_string()));
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::json!({"jira_issue": "OPS-12", "assigned_to": "alice"})
        );

        let dup = IncidentOutcome::deduplicated("OPS-9");
        assert!(dup.is_duplicate());
        assert_eq!(
            serde_json::to_value(&dup).unwrap(),
            serde_json::json!({"jira_issue": "OPS-9", "status": "already exists"})
        );
    }

    #[test]
    fn test_pod_ref_display() {
        assert_eq!(PodRef::new("payments", "api-7f9").to_string(), "payments/api-7f9");
    }
}
