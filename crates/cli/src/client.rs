//! API client for the incident orchestrator HTTP API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Non-success answer from the orchestrator
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

/// API client for the orchestrator
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Scans run synchronously on the server and can take a while
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }
}

/// The `error` field of an error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// API request and response types

#[derive(Debug, Clone, Serialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanRequest {
    pub cluster_config: ClusterConfig,
    pub namespaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_labels: Option<Map<String, Value>>,
    pub time_range_minutes: u32,
    pub log_levels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_patterns: Option<Vec<String>>,
    pub max_lines_per_pod: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub cluster_name: String,
    pub total_logs: usize,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub pods_scanned: Vec<String>,
    pub scan_time: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub incident_analysis: Option<Value>,
    #[serde(default)]
    pub incident_integration: Option<Value>,
}

impl ScanResponse {
    /// Root cause named by the prediction stage, if it succeeded
    pub fn root_cause(&self) -> Option<&str> {
        let prediction = self.incident_analysis.as_ref()?.get("prediction")?;
        prediction
            .get("root_cause")
            .or_else(|| prediction.get("prediction"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobAccepted {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Complete { result: ScanResponse },
    Error { error: String },
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete { .. } => "complete",
            JobStatus::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentReport {
    pub error_summary: String,
    pub error_details: String,
    pub file_path: String,
    pub line_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentResponse {
    pub jira_issue: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdateResponse {
    pub status: String,
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterContext {
    pub name: String,
    pub context: String,
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterList {
    pub clusters: Vec<ClusterContext>,
    #[serde(default)]
    pub error: Option<String>,
}
