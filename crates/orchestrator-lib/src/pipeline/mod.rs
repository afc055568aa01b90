//! Four-stage incident analysis
//!
//! Stages run strictly in order: log analysis, root-cause prediction,
//! knowledge search, action recommendation. The predicted root cause feeds
//! the search query and the recommender. A failing stage contributes an
//! `{error}` result and never aborts the others.

mod escalation;


pub use escalation::{escalate, HttpIncidentSink, IncidentSink, DEFAULT_ESCALATION_TIMEOUT};

use crate::config_store::ServiceConfig;
use crate::error::{OrchestratorError, Result};
use crate::health::{components, HealthRegistry};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-stage HTTP timeout
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of knowledge-base hits requested
pub const SEARCH_TOP_K: usize = 5;

/// Query used when no root cause was predicted
pub const FALLBACK_QUERY: &str = "error";

/// Prediction fields that may carry the root cause, in priority order
pub const ROOT_CAUSE_FIELDS: &[&str] = &["root_cause", "prediction"];

/// Root causes that warrant a ticket
pub const CRITICAL_CAUSES: &[&str] = &[
    "memory exhaustion",
    "disk full",
    "service unavailable",
    "network timeout",
    "permission issue",
    "critical",
];

/// True if the root cause names one of the critical categories
pub fn is_critical(root_cause: &str) -> bool {
    let lower = root_cause.to_lowercase();
    CRITICAL_CAUSES.iter().any(|cause| lower.contains(cause))
}

/// Error payload of a degraded stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageError {
    pub error: String,
}

/// A stage's payload, or the error it degraded to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutcome<T> {
    Failed(StageError),
    Ok(T),
}

impl<T> StageOutcome<T> {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(StageError {
            error: message.into(),
        })
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Failed(e) => Some(&e.error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl<T> From<Result<T>> for StageOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Root-cause predictor response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction(pub Map<String, Value>);

impl Prediction {
    /// First non-empty candidate field
    pub fn root_cause(&self) -> Option<&str> {
        ROOT_CAUSE_FIELDS
            .iter()
            .filter_map(|field| self.0.get(*field).and_then(Value::as_str))
            .find(|value| !value.is_empty())
    }
}

/// Knowledge-base search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub id: Value,
    pub text: String,
    pub resolution: String,
    pub score: f64,
}

/// Action recommender response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub action: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregated result of the four stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis: StageOutcome<Value>,
    pub prediction: StageOutcome<Prediction>,
    pub search: StageOutcome<Vec<SearchHit>>,
    pub recommendations: StageOutcome<Recommendation>,
}

impl AnalysisOutcome {
    pub fn root_cause(&self) -> Option<&str> {
        self.prediction.ok().and_then(Prediction::root_cause)
    }

    /// True if the predicted root cause is critical
    pub fn is_critical(&self) -> bool {
        self.root_cause().map(is_critical).unwrap_or(false)
    }

    /// Log-analysis stage output rendered as text for ticket details
    pub fn analysis_text(&self) -> String {
        serde_json::to_string(&self.analysis).unwrap_or_default()
    }
}

/// The four analysis stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LogAnalysis,
    RootCause,
    KnowledgeSearch,
    ActionRecommendation,
}

impl Stage {
    /// Health component and metric label
    pub fn component(&self) -> &'static str {
        match self {
            Stage::LogAnalysis => components::LOG_ANALYZER,
            Stage::RootCause => components::ROOT_CAUSE_PREDICTOR,
            Stage::KnowledgeSearch => components::KNOWLEDGE_BASE,
            Stage::ActionRecommendation => components::ACTION_RECOMMENDER,
        }
    }

    /// Human-readable service name used in error messages
    pub fn service_name(&self) -> &'static str {
        match self {
            Stage::LogAnalysis => "Log Analyzer",
            Stage::RootCause => "Root Cause Predictor",
            Stage::KnowledgeSearch => "Knowledge Base",
            Stage::ActionRecommendation => "Action Recommender",
        }
    }
}

/// Stage endpoints, read from the config store for every scan
#[derive(Debug, Clone)]
pub struct PipelineEndpoints {
    pub log_analyzer: String,
    pub root_cause_predictor: String,
    pub knowledge_base: String,
    pub action_recommender: String,
}

impl From<&ServiceConfig> for PipelineEndpoints {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            log_analyzer: config.log_analyzer_url.clone(),
            root_cause_predictor: config.root_cause_predictor_url.clone(),
            knowledge_base: config.knowledge_base_url.clone(),
            action_recommender: config.action_recommender_url.clone(),
        }
    }
}

/// Drop repeated lines, keeping the first occurrence
pub fn dedup_lines(lines: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(lines.len());
    lines
        .iter()
        .filter(|line| seen.insert(line.as_str()))
        .cloned()
        .collect()
}

/// Runs the analysis stages against the configured services
pub struct AnalysisPipeline {
    client: reqwest::Client,
    stage_timeout: Duration,
    health: Option<HealthRegistry>,
    metrics: OrchestratorMetrics,
    logger: StructuredLogger,
}

impl AnalysisPipeline {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            health: None,
            metrics: OrchestratorMetrics::new(),
            logger: StructuredLogger::new("pipeline"),
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run all four stages over the de-duplicated lines
    pub async fn run(&self, endpoints: &PipelineEndpoints, logs: &[String]) -> AnalysisOutcome {
        let started = Instant::now();
        let logs = dedup_lines(logs);
        debug!(lines = logs.len(), "Starting incident analysis");

        let analysis: StageOutcome<Value> = self
            .call(Stage::LogAnalysis, &endpoints.log_analyzer, &json!({ "logs": logs }))
            .await;

        let prediction: StageOutcome<Prediction> = self
            .call(Stage::RootCause, &endpoints.root_cause_predictor, &json!({ "logs": logs }))
            .await;

        let query = prediction
            .ok()
            .and_then(Prediction::root_cause)
            .unwrap_or(FALLBACK_QUERY)
            .to_string();

        let search: StageOutcome<Vec<SearchHit>> = self
            .call(
                Stage::KnowledgeSearch,
                &endpoints.knowledge_base,
                &json!({ "query": query, "top_k": SEARCH_TOP_K }),
            )
            .await;

        let recommendations: StageOutcome<Recommendation> = self
            .call(
                Stage::ActionRecommendation,
                &endpoints.action_recommender,
                &json!({ "root_cause": query }),
            )
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            root_cause = %query,
            duration_secs = elapsed,
            "Incident analysis finished"
        );

        AnalysisOutcome {
            analysis,
            prediction,
            search,
            recommendations,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        stage: Stage,
        url: &str,
        body: &Value,
    ) -> StageOutcome<T> {
        match self.post(stage, url, body).await {
            Ok(value) => {
                if let Some(health) = &self.health {
                    health.record_success(stage.component()).await;
                }
                StageOutcome::Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                self.metrics.inc_stage_failures(stage.component());
                self.logger.log_stage_failure(stage.component(), &message);
                if let Some(health) = &self.health {
                    health.record_failure(stage.component(), message.clone()).await;
                }
                StageOutcome::failed(message)
            }
        }
    }

    async fn post<T: DeserializeOwned>(&self, stage: Stage, url: &str, body: &Value) -> Result<T> {
        let fail = |message: String| OrchestratorError::upstream(stage.service_name(), message);

        let resp = self
            .client
            .post(url)
            .json(body)
            .timeout(self.stage_timeout)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {}: {}", status.as_u16(), text.trim())));
        }

        resp.json::<T>()
            .await
            .map_err(|e| fail(format!("undecodable response: {e}")))
    }
}
