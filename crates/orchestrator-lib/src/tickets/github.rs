//! GitHub code host: blame, CODEOWNERS and repository owner

use super::codeowners::CODEOWNERS_PATHS;
use super::settings::{require, IntegrationSettings};
use super::CodeHost;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const GITHUB_API_URL: &str = "https://api.github.com";

const SERVICE: &str = "GitHub";
const CLIENT_AGENT: &str = concat!("incident-orchestrator/", env!("CARGO_PKG_VERSION"));

const BLAME_QUERY: &str = r#"
query($owner: String!, $name: String!, $path: String!) {
  repository(owner: $owner, name: $name) {
    defaultBranchRef {
      target {
        ... on Commit {
          blame(path: $path) {
            ranges {
              startingLine
              endingLine
              commit { author { user { login } } }
            }
          }
        }
      }
    }
  }
}"#;

/// Login of the author whose blame range covers `line`
pub fn author_at_line(blame: &Value, line: u32) -> Option<String> {
    let ranges = blame
        .pointer("/data/repository/defaultBranchRef/target/blame/ranges")?
        .as_array()?;
    let line = u64::from(line);

    ranges
        .iter()
        .find(|range| {
            let start = range["startingLine"].as_u64().unwrap_or(0);
            let end = range["endingLine"].as_u64().unwrap_or(0);
            (start..=end).contains(&line)
        })
        .and_then(|range| range.pointer("/commit/author/user/login"))
        .and_then(Value::as_str)
        .filter(|login| !login.is_empty())
        .map(str::to_string)
}

/// GitHub REST + GraphQL client scoped to one `owner/name` repository
pub struct GitHubHost {
    client: reqwest::Client,
    api_url: String,
    token: String,
    owner: String,
    name: String,
    timeout: Duration,
}

impl GitHubHost {
    /// `repo` is `owner/name`
    pub fn new(client: reqwest::Client, token: impl Into<String>, repo: &str) -> Result<Self> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                OrchestratorError::Config(format!("GITHUB_REPO must be owner/name, got {repo:?}"))
            })?;

        Ok(Self {
            client,
            api_url: GITHUB_API_URL.to_string(),
            token: token.into(),
            owner: owner.to_string(),
            name: name.to_string(),
            timeout: super::jira::DEFAULT_TRACKER_TIMEOUT,
        })
    }

    pub fn from_settings(client: reqwest::Client, settings: &IntegrationSettings) -> Result<Self> {
        let token = require("GITHUB_TOKEN", &settings.github_token)?;
        let repo = require("GITHUB_REPO", &settings.github_repo)?;
        Self::new(client, token, repo)
    }

    /// Point at a different API root, e.g. GitHub Enterprise
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(USER_AGENT, CLIENT_AGENT)
            .timeout(self.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        self.authed(request)
            .send()
            .await
            .map_err(|e| OrchestratorError::upstream(SERVICE, e.to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(OrchestratorError::upstream(
            SERVICE,
            format!("HTTP {}: {}", status.as_u16(), text.trim()),
        ))
    }

    async fn json(resp: reqwest::Response) -> Result<Value> {
        Self::check(resp)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| OrchestratorError::upstream(SERVICE, format!("undecodable response: {e}")))
    }
}

#[async_trait]
impl CodeHost for GitHubHost {
    async fn blame_author(&self, path: &str, line: u32) -> Result<Option<String>> {
        let body = json!({
            "query": BLAME_QUERY,
            "variables": { "owner": self.owner, "name": self.name, "path": path },
        });
        let resp = self
            .send(self.client.post(format!("{}/graphql", self.api_url)).json(&body))
            .await?;
        let blame = Self::json(resp).await?;

        if let Some(errors) = blame.get("errors").filter(|e| !e.is_null()) {
            return Err(OrchestratorError::upstream(SERVICE, errors.to_string()));
        }
        Ok(author_at_line(&blame, line))
    }

    async fn codeowners(&self) -> Result<Option<String>> {
        for path in CODEOWNERS_PATHS {
            let url = format!("{}/repos/{}/contents/{path}", self.api_url, self.repo());
            let resp = self
                .send(self.client.get(url).header(ACCEPT, "application/vnd.github.raw"))
                .await?;

            if resp.status() == StatusCode::NOT_FOUND {
                debug!(path = %path, "No CODEOWNERS at path");
                continue;
            }
            let content = Self::check(resp)
                .await?
                .text()
                .await
                .map_err(|e| OrchestratorError::upstream(SERVICE, e.to_string()))?;
            return Ok(Some(content));
        }
        Ok(None)
    }

    async fn repository_owner(&self) -> Result<String> {
        let resp = self
            .send(
                self.client
                    .get(format!("{}/repos/{}", self.api_url, self.repo()))
                    .header(ACCEPT, "application/vnd.github+json"),
            )
            .await?;
        let repo = Self::json(resp).await?;

        Ok(repo
            .pointer("/owner/login")
            .and_then(Value::as_str)
            .unwrap_or(&self.owner)
            .to_string())
    }
}
