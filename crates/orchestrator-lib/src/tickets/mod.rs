//! Incident ticket lifecycle
//!
//! Tickets live only in the external tracker. Creation first searches for an
//! open ticket with the same summary, so repeated escalations of one root
//! cause converge on a single ticket. Closure is driven by merged pull
//! requests that mention ticket keys.

pub mod codeowners;
pub mod github;
pub mod jira;
pub mod settings;


use crate::config_store::ConfigStore;
use crate::error::{OrchestratorError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{IncidentEvent, IncidentOutcome};
use crate::notify::{incident_created_message, incident_resolved_message, Notifier};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::pipeline::IncidentSink;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

pub use codeowners::CodeOwners;
pub use github::GitHubHost;
pub use jira::JiraTracker;
pub use settings::IntegrationSettings;

/// Transition applied to tickets fixed by a merged pull request
pub const DONE_TRANSITION: &str = "Done";

/// Issue type of created incident tickets
pub const INCIDENT_ISSUE_TYPE: &str = "Bug";

/// Issue tracker operations
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Key of an open ticket in `project` whose summary matches
    async fn find_open(&self, project: &str, summary: &str) -> Result<Option<String>>;

    /// Create a ticket and return its key
    async fn create(&self, ticket: &NewTicket) -> Result<String>;

    async fn assign(&self, key: &str, assignee: &str) -> Result<()>;

    /// Apply the workflow transition called `name`
    async fn transition(&self, key: &str, name: &str) -> Result<()>;
}

/// Source-control host used to find who owns a piece of code
#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn blame_author(&self, path: &str, line: u32) -> Result<Option<String>>;

    /// Raw CODEOWNERS content, if the repository has one
    async fn codeowners(&self) -> Result<Option<String>>;

    async fn repository_owner(&self) -> Result<String>;
}

/// Fields of a ticket to create
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub project: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
}

impl NewTicket {
    /// Incident ticket for `summary`
    pub fn incident(project: &str, summary: &str, description: &str) -> Self {
        Self {
            project: project.to_string(),
            summary: format!("Incident: {summary}"),
            description: description.to_string(),
            issue_type: INCIDENT_ISSUE_TYPE.to_string(),
        }
    }
}

/// Subset of a GitHub `pull_request` webhook payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
}

impl PullRequestEvent {
    /// The pull request, when this event is a merge
    pub fn merged_pull_request(&self) -> Option<&PullRequest> {
        self.pull_request
            .as_ref()
            .filter(|pr| self.action == "closed" && pr.merged)
    }
}

fn ticket_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Z]+-\d+").expect("ticket key pattern is valid"))
}

/// Ticket keys mentioned in `texts`, first occurrence order
pub fn extract_ticket_keys<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for text in texts {
        for found in ticket_key_pattern().find_iter(text) {
            if !keys.iter().any(|k| k == found.as_str()) {
                keys.push(found.as_str().to_string());
            }
        }
    }
    keys
}

/// Creates, assigns and closes incident tickets
pub struct TicketManager {
    tracker: Arc<dyn TicketTracker>,
    code_host: std::result::Result<Arc<dyn CodeHost>, String>,
    project: String,
    notifier: Notifier,
    metrics: OrchestratorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl TicketManager {
    pub fn new(tracker: Arc<dyn TicketTracker>, project: impl Into<String>) -> Self {
        Self {
            tracker,
            code_host: Err("GITHUB_TOKEN is not set".to_string()),
            project: project.into(),
            notifier: Notifier::disabled(),
            metrics: OrchestratorMetrics::new(),
            logger: StructuredLogger::new("tickets"),
            health: None,
        }
    }

    /// Manager wired to Jira, GitHub and Slack from `settings`
    ///
    /// Fails only when the tracker itself is unconfigured. A missing code
    /// host surfaces later, when an owner has to be resolved.
    pub fn from_settings(client: reqwest::Client, settings: &IntegrationSettings) -> Result<Self> {
        let tracker = JiraTracker::from_settings(client.clone(), settings)?;
        let mut manager = Self::new(Arc::new(tracker), settings.jira_project.clone())
            .with_notifier(Notifier::slack(client.clone(), &settings.slack_webhook_url));

        manager.code_host = GitHubHost::from_settings(client, settings)
            .map(|host| Arc::new(host) as Arc<dyn CodeHost>)
            .map_err(|e| match e {
                OrchestratorError::Config(message) => message,
                other => other.to_string(),
            });
        Ok(manager)
    }

    pub fn with_code_host(mut self, code_host: Arc<dyn CodeHost>) -> Self {
        self.code_host = Ok(code_host);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    fn code_host(&self) -> Result<&Arc<dyn CodeHost>> {
        self.code_host
            .as_ref()
            .map_err(|message| OrchestratorError::Config(message.clone()))
    }

    async fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Some(health) = &self.health {
            match &result {
                Ok(_) => health.record_success(components::TRACKER).await,
                Err(e) => health.record_failure(components::TRACKER, e.to_string()).await,
            }
        }
        result
    }

    /// Return the open ticket for this incident, creating one if needed
    pub async fn create_or_dedup(&self, event: &IncidentEvent) -> Result<IncidentOutcome> {
        let project = settings::require("JIRA_PROJECT", &self.project)?;
        let summary = event.error_summary.as_str();

        let existing = self.track(self.tracker.find_open(project, summary).await).await?;
        if let Some(key) = existing {
            info!(ticket = %key, summary = %summary, "Open ticket already exists");
            self.metrics.inc_tickets_created("deduplicated");
            self.logger.log_ticket_created(&key, None, true);
            return Ok(IncidentOutcome::deduplicated(key));
        }

        let owner = self.resolve_owner(event).await?;
        let ticket = NewTicket::incident(project, summary, &event.error_details);
        let key = self.track(self.tracker.create(&ticket).await).await?;

        if let Some(owner) = &owner {
            if let Err(e) = self.tracker.assign(&key, owner).await {
                warn!(ticket = %key, assignee = %owner, error = %e, "Failed to assign ticket");
            }
        }

        self.notifier
            .announce(incident_created_message(summary, owner.as_deref(), &key));
        self.metrics.inc_tickets_created("created");
        self.logger.log_ticket_created(&key, owner.as_deref(), false);

        Ok(IncidentOutcome::created(key, owner))
    }

    /// Owner for the code behind `event`
    ///
    /// Tries blame at the reported line, then CODEOWNERS, then the
    /// repository owner. Lookup failures are logged and fall through; only
    /// a missing code-host configuration is an error.
    pub async fn resolve_owner(&self, event: &IncidentEvent) -> Result<Option<String>> {
        let host = self.code_host()?;
        let path = event.file_path.as_str();

        if !path.is_empty() {
            match host.blame_author(path, event.line_number).await {
                Ok(Some(author)) => {
                    debug!(path = %path, line = event.line_number, author = %author, "Owner from blame");
                    return Ok(Some(author));
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path, error = %e, "Blame lookup failed"),
            }

            match host.codeowners().await {
                Ok(Some(content)) => {
                    if let Some(owner) = CodeOwners::parse(&content).owner_for(path) {
                        debug!(path = %path, owner = %owner, "Owner from CODEOWNERS");
                        return Ok(Some(owner));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "CODEOWNERS lookup failed"),
            }
        }

        match host.repository_owner().await {
            Ok(owner) if !owner.is_empty() => Ok(Some(owner)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Repository owner lookup failed, leaving ticket unassigned");
                Ok(None)
            }
        }
    }

    /// Transition every ticket mentioned by a merged pull request to done
    ///
    /// Returns the keys that were closed. Events other than a merge are
    /// ignored; per-ticket failures are logged and skipped.
    pub async fn close_from_merge(&self, event: &PullRequestEvent) -> Vec<String> {
        let Some(pr) = event.merged_pull_request() else {
            debug!(action = %event.action, "Ignoring pull request event");
            return Vec::new();
        };

        let keys = extract_ticket_keys([pr.title.as_str(), pr.body.as_deref().unwrap_or("")]);
        let mut closed = Vec::with_capacity(keys.len());

        for key in keys {
            let result = self.tracker.transition(&key, DONE_TRANSITION).await;
            match self.track(result).await {
                Ok(()) => {
                    self.metrics.inc_tickets_closed("closed");
                    self.logger.log_ticket_closed(&key, &pr.html_url);
                    self.notifier
                        .announce(incident_resolved_message(&key, &pr.html_url));
                    closed.push(key);
                }
                Err(e) => {
                    self.metrics.inc_tickets_closed("failed");
                    warn!(ticket = %key, error = %e, "Failed to close ticket");
                }
            }
        }
        closed
    }
}

#[async_trait]
impl IncidentSink for TicketManager {
    async fn report(&self, event: &IncidentEvent) -> Result<IncidentOutcome> {
        self.create_or_dedup(event).await
    }
}

/// Source of the ticket manager for a request
///
/// `Settings` rebuilds the manager from the environment and the config
/// store on every call, so credential changes apply without a restart.
#[derive(Clone)]
pub enum TicketProvider {
    Settings {
        client: reqwest::Client,
        store: Arc<ConfigStore>,
        health: Option<HealthRegistry>,
    },
    Fixed(Arc<TicketManager>),
}

impl TicketProvider {
    pub fn manager(&self) -> Result<Arc<TicketManager>> {
        match self {
            Self::Fixed(manager) => Ok(manager.clone()),
            Self::Settings {
                client,
                store,
                health,
            } => {
                let settings = IntegrationSettings::resolve(&store.get());
                let mut manager = TicketManager::from_settings(client.clone(), &settings)?;
                if let Some(health) = health {
                    manager = manager.with_health(health.clone());
                }
                Ok(Arc::new(manager))
            }
        }
    }
}

#[async_trait]
impl IncidentSink for TicketProvider {
    async fn report(&self, event: &IncidentEvent) -> Result<IncidentOutcome> {
        self.manager()?.create_or_dedup(event).await
    }
}
