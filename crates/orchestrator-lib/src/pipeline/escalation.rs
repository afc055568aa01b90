//! Hand-off of critical incidents to a ticket sink

use super::{AnalysisOutcome, StageOutcome};
use crate::error::{OrchestratorError, Result};
use crate::models::{IncidentEvent, IncidentOutcome};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Bound on a single escalation attempt
pub const DEFAULT_ESCALATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Destination for critical incidents
#[async_trait]
pub trait IncidentSink: Send + Sync {
    async fn report(&self, event: &IncidentEvent) -> Result<IncidentOutcome>;
}

/// Remote incident integrator reached over HTTP
pub struct HttpIncidentSink {
    client: reqwest::Client,
    url: String,
}

impl HttpIncidentSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl IncidentSink for HttpIncidentSink {
    async fn report(&self, event: &IncidentEvent) -> Result<IncidentOutcome> {
        let resp = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| OrchestratorError::upstream("Incident integrator", e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(OrchestratorError::upstream(
                "Incident integrator",
                format!("HTTP {}: {}", status.as_u16(), text.trim()),
            ));
        }

        resp.json::<IncidentOutcome>().await.map_err(|e| {
            OrchestratorError::upstream("Incident integrator", format!("undecodable response: {e}"))
        })
    }
}

/// Report a critical analysis to `sink`
///
/// Returns `None` when the root cause is not critical. Failures and
/// timeouts are folded into the returned outcome.
pub async fn escalate(
    sink: &dyn IncidentSink,
    analysis: &AnalysisOutcome,
    timeout: Duration,
) -> Option<StageOutcome<IncidentOutcome>> {
    let root_cause = analysis.root_cause().filter(|rc| super::is_critical(rc))?;
    let event = IncidentEvent::new(root_cause, analysis.analysis_text());

    let outcome = match tokio::time::timeout(timeout, sink.report(&event)).await {
        Ok(Ok(outcome)) => {
            info!(root_cause = %root_cause, ticket = %outcome.ticket_key, "Incident integration result");
            StageOutcome::Ok(outcome)
        }
        Ok(Err(e)) => {
            warn!(root_cause = %root_cause, error = %e, "Incident integration failed");
            StageOutcome::failed(e.to_string())
        }
        Err(_) => {
            warn!(root_cause = %root_cause, timeout_secs = timeout.as_secs_f64(), "Incident integration timed out");
            StageOutcome::failed(format!(
                "incident integration timed out after {}s",
                timeout.as_secs_f64()
            ))
        }
    };

    Some(outcome)
}
