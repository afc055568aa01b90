//! Best-effort chat notifications
//!
//! Messages are sent on a spawned task. A failed send is logged and
//! otherwise ignored; it never affects the ticket operation that caused it.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Timeout for one chat webhook call
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can deliver a text message to a channel
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Slack incoming webhook
pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl SlackWebhook {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

#[async_trait]
impl ChatSink for SlackWebhook {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OrchestratorError::upstream("Slack", e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OrchestratorError::upstream(
                "Slack",
                format!("HTTP {}", resp.status().as_u16()),
            ));
        }
        Ok(())
    }
}

/// Fire-and-forget notifier
#[derive(Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<dyn ChatSink>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn ChatSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Notifier that drops every message
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Slack notifier, or disabled when no webhook URL is configured
    pub fn slack(client: reqwest::Client, webhook_url: &str) -> Self {
        if webhook_url.trim().is_empty() {
            return Self::disabled();
        }
        Self::new(Arc::new(SlackWebhook::new(client, webhook_url)))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Send `text` in the background
    ///
    /// Must be called from within a tokio runtime. Returns the task handle,
    /// or `None` when notifications are disabled.
    pub fn announce(&self, text: impl Into<String>) -> Option<JoinHandle<()>> {
        let text = text.into();
        let Some(sink) = self.sink.clone() else {
            warn!("Chat webhook not configured, skipping notification");
            return None;
        };

        Some(tokio::spawn(async move {
            match sink.send(&text).await {
                Ok(()) => debug!("Notification sent"),
                Err(e) => warn!(error = %e, "Failed to send chat notification"),
            }
        }))
    }
}

/// Message for a newly created incident ticket
pub fn incident_created_message(summary: &str, assignee: Option<&str>, ticket: &str) -> String {
    format!(
        ":rotating_light: New Incident Created: {summary}\nAssigned to: {}\nJira: {ticket}",
        assignee.unwrap_or("unassigned")
    )
}

/// Message for a ticket closed by a merged pull request
pub fn incident_resolved_message(ticket: &str, pull_request_url: &str) -> String {
    format!(":white_check_mark: Incident Resolved: {ticket}\nClosed by PR: {pull_request_url}")
}
