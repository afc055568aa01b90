//! Jira REST v2 tracker

use super::settings::{require, IntegrationSettings};
use super::{NewTicket, TicketTracker};
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Timeout for one tracker call
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

const SERVICE: &str = "Jira";

/// Quote a value for use inside a JQL string literal
pub fn jql_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Search for open tickets in `project` whose summary matches `summary`
pub fn open_ticket_jql(project: &str, summary: &str) -> String {
    format!(
        "project={project} AND summary~{} AND statusCategory != Done",
        jql_quote(summary)
    )
}

#[derive(Debug, Deserialize)]
struct IssueRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<IssueRef>,
}

#[derive(Debug, Deserialize)]
struct Transition {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TransitionsResponse {
    #[serde(default)]
    transitions: Vec<Transition>,
}

/// Jira client authenticated with user + API token
pub struct JiraTracker {
    client: reqwest::Client,
    server: String,
    user: String,
    token: String,
    timeout: Duration,
}

impl JiraTracker {
    pub fn new(
        client: reqwest::Client,
        server: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
            user: user.into(),
            token: token.into(),
            timeout: DEFAULT_TRACKER_TIMEOUT,
        }
    }

    /// Build from settings, failing on the first missing credential
    pub fn from_settings(client: reqwest::Client, settings: &IntegrationSettings) -> Result<Self> {
        let server = require("JIRA_SERVER", &settings.jira_server)?;
        let user = require("JIRA_USER", &settings.jira_user)?;
        let token = require("JIRA_TOKEN", &settings.jira_token)?;
        Ok(Self::new(client, server, user, token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.server)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let resp = self
            .authed(request)
            .send()
            .await
            .map_err(|e| OrchestratorError::upstream(SERVICE, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(OrchestratorError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status.as_u16(), text.trim()),
            ));
        }
        Ok(resp)
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
        resp.json::<T>()
            .await
            .map_err(|e| OrchestratorError::upstream(SERVICE, format!("undecodable response: {e}")))
    }
}

#[async_trait]
impl TicketTracker for JiraTracker {
    async fn find_open(&self, project: &str, summary: &str) -> Result<Option<String>> {
        let jql = open_ticket_jql(project, summary);
        debug!(jql = %jql, "Searching for open tickets");

        let resp = self
            .send(self.client.get(self.url("search")).query(&[
                ("jql", jql.as_str()),
                ("maxResults", "1"),
                ("fields", "summary"),
            ]))
            .await?;
        let found: SearchResponse = Self::decode(resp).await?;
        Ok(found.issues.into_iter().next().map(|issue| issue.key))
    }

    async fn create(&self, ticket: &NewTicket) -> Result<String> {
        let body = json!({
            "fields": {
                "project": { "key": ticket.project },
                "summary": ticket.summary,
                "description": ticket.description,
                "issuetype": { "name": ticket.issue_type },
            }
        });

        let resp = self.send(self.client.post(self.url("issue")).json(&body)).await?;
        let created: IssueRef = Self::decode(resp).await?;
        Ok(created.key)
    }

    async fn assign(&self, key: &str, assignee: &str) -> Result<()> {
        self.send(
            self.client
                .put(self.url(&format!("issue/{key}/assignee")))
                .json(&json!({ "name": assignee })),
        )
        .await?;
        Ok(())
    }

    async fn transition(&self, key: &str, name: &str) -> Result<()> {
        let path = format!("issue/{key}/transitions");
        let resp = self.send(self.client.get(self.url(&path))).await?;
        let available: TransitionsResponse = Self::decode(resp).await?;

        let transition = available
            .transitions
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                OrchestratorError::upstream(
                    SERVICE,
                    format!("{key} has no transition named {name}"),
                )
            })?;

        self.send(
            self.client
                .post(self.url(&path))
                .json(&json!({ "transition": { "id": transition.id } })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::DONE_TRANSITION;
    use mockito::Matcher;

    fn tracker(server: &mockito::ServerGuard) -> JiraTracker {
        JiraTracker::new(reqwest::Client::new(), server.url(), "bot@acme.io", "api-token")
    }

    #[test]
    fn test_jql_quoting() {
        assert_eq!(
            open_ticket_jql("OPS", "Memory exhaustion"),
            r#"project=OPS AND summary~"Memory exhaustion" AND statusCategory != Done"#
        );
        assert_eq!(jql_quote(r#"say "hi" \ bye"#), r#""say \"hi\" \\ bye""#);
    }

    #[tokio::test]
    async fn test_find_open_returns_first_key() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/rest/api/2/search")
            .match_query(Matcher::UrlEncoded(
                "jql".into(),
                r#"project=OPS AND summary~"Disk full" AND statusCategory != Done"#.into(),
            ))
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .with_body(r#"{"issues": [{"key": "OPS-41"}, {"key": "OPS-12"}]}"#)
            .create_async()
            .await;

        let key = tracker(&server).find_open("OPS", "Disk full").await.unwrap();
        search.assert_async().await;
        assert_eq!(key.as_deref(), Some("OPS-41"));
    }

    #[tokio::test]
    async fn test_create_issue_shape() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/rest/api/2/issue")
            .match_body(Matcher::Json(json!({
                "fields": {
                    "project": {"key": "OPS"},
                    "summary": "Incident: Disk full",
                    "description": "details",
                    "issuetype": {"name": "Bug"}
                }
            })))
            .with_status(201)
            .with_body(r#"{"id": "10001", "key": "OPS-42"}"#)
            .create_async()
            .await;

        let key = tracker(&server)
            .create(&NewTicket::incident("OPS", "Disk full", "details"))
            .await
            .unwrap();
        create.assert_async().await;
        assert_eq!(key, "OPS-42");
    }

    #[tokio::test]
    async fn test_transition_to_done() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/rest/api/2/issue/OPS-7/transitions")
            .with_body(r#"{"transitions": [{"id": "11", "name": "In Progress"}, {"id": "31", "name": "Done"}]}"#)
            .create_async()
            .await;
        let apply = server
            .mock("POST", "/rest/api/2/issue/OPS-7/transitions")
            .match_body(Matcher::Json(json!({"transition": {"id": "31"}})))
            .with_status(204)
            .create_async()
            .await;

        tracker(&server).transition("OPS-7", DONE_TRANSITION).await.unwrap();
        apply.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_transition_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/rest/api/2/issue/OPS-8/transitions")
            .with_body(r#"{"transitions": [{"id": "11", "name": "In Progress"}]}"#)
            .create_async()
            .await;

        let err = tracker(&server).transition("OPS-8", "Done").await.unwrap_err();
        assert!(err.to_string().contains("no transition named Done"));
    }

    #[tokio::test]
    async fn test_http_errors_carry_status() {
        let mut server = mockito::Server::new_async().await;
        let _assign = server
            .mock("PUT", "/rest/api/2/issue/OPS-9/assignee")
            .with_status(400)
            .with_body(r#"{"errorMessages": ["User 'ghost' does not exist."]}"#)
            .create_async()
            .await;

        let err = tracker(&server).assign("OPS-9", "ghost").await.unwrap_err();
        match err {
            OrchestratorError::Upstream { service, message } => {
                assert_eq!(service, "Jira");
                assert!(message.contains("400"));
                assert!(message.contains("ghost"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_from_settings_requires_credentials() {
        let settings = IntegrationSettings {
            jira_server: "https://acme.atlassian.net".to_string(),
            jira_user: "bot".to_string(),
            ..IntegrationSettings::default()
        };
        let err = JiraTracker::from_settings(reqwest::Client::new(), &settings)
            .err()
            .unwrap();
        assert!(err.to_string().contains("JIRA_TOKEN"));
    }
}
