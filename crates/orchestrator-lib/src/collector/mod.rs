//! Cluster log collection
//!
//! Pods are discovered per namespace and their recent logs tailed through
//! kubectl. Every invocation goes through a [`CommandRunner`], so the process
//! boundary can be replaced in tests.

mod credentials;
mod discovery;
mod filters;
mod kubectl;

#[cfg(test)]
mod tests;

pub use credentials::{setup_credentials, CredentialHandle};
pub use discovery::{
    labels_match, parse_contexts, parse_namespace_list, parse_pod_list, ClusterContext,
};
pub use filters::{by_level, by_pattern, LogFilter};
pub use kubectl::{CommandRunner, KubectlRunner, DEFAULT_KUBECTL_TIMEOUT};

use crate::error::{OrchestratorError, Result};
use crate::models::PodRef;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of pods whose logs are fetched at once
pub const DEFAULT_POD_CONCURRENCY: usize = 8;

/// What a failed namespace listing does to the scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceFailurePolicy {
    /// Record the failure in the scan's errors and keep going
    #[default]
    Isolate,
    /// Fail the whole scan
    Propagate,
}

impl FromStr for NamespaceFailurePolicy {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "propagate" => Ok(Self::Propagate),
            other => Err(OrchestratorError::Config(format!(
                "unknown namespace failure policy: {other}"
            ))),
        }
    }
}

/// Pods found across the requested namespaces
#[derive(Debug, Default)]
pub struct PodDiscovery {
    pub pods: Vec<PodRef>,
    pub errors: Vec<String>,
}

/// How far back and how much to read per pod
#[derive(Debug, Clone, Copy)]
pub struct LogWindow {
    pub lookback_minutes: u32,
    pub max_lines: u32,
}

/// Filtered logs gathered from a set of pods
#[derive(Debug, Default)]
pub struct CollectedLogs {
    pub logs: Vec<String>,
    /// Pods with at least one surviving line and their line count, in discovery order
    pub contributions: Vec<(PodRef, usize)>,
    pub errors: Vec<String>,
}

impl CollectedLogs {
    pub fn pods_scanned(&self) -> Vec<String> {
        self.contributions
            .iter()
            .map(|(pod, _)| pod.to_string())
            .collect()
    }

    /// Line counts per namespace, for metrics
    pub fn lines_per_namespace(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (pod, lines) in &self.contributions {
            *counts.entry(pod.namespace.clone()).or_insert(0) += lines;
        }
        counts
    }
}

/// kubectl-backed pod discovery and log retrieval
pub struct LogCollector {
    runner: Arc<dyn CommandRunner>,
    concurrency: usize,
}

impl LogCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            concurrency: DEFAULT_POD_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Running pods in one namespace whose labels match the selector
    pub async fn list_pods(
        &self,
        creds: &CredentialHandle,
        namespace: &str,
        selector: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<PodRef>> {
        let args = creds.command(&["get", "pods", "-n", namespace, "-o", "json"]);
        let output = self.runner.run(&args).await?;
        let pods = parse_pod_list(&output, namespace, selector)?;
        debug!(namespace = %namespace, pods = pods.len(), "Listed pods");
        Ok(pods)
    }

    /// Discover pods across namespaces in request order
    pub async fn discover_pods(
        &self,
        creds: &CredentialHandle,
        namespaces: &[String],
        selector: Option<&BTreeMap<String, String>>,
        policy: NamespaceFailurePolicy,
    ) -> Result<PodDiscovery> {
        let mut discovery = PodDiscovery::default();

        for namespace in namespaces {
            match self.list_pods(creds, namespace, selector).await {
                Ok(pods) => discovery.pods.extend(pods),
                Err(e) => {
                    let message = format!("Failed to list pods in namespace {namespace}: {e}");
                    match policy {
                        NamespaceFailurePolicy::Propagate => {
                            error!(namespace = %namespace, error = %e, "Namespace listing failed");
                            return Err(OrchestratorError::Resource(message));
                        }
                        NamespaceFailurePolicy::Isolate => {
                            warn!(namespace = %namespace, error = %e, "Namespace listing failed, continuing");
                            discovery.errors.push(message);
                        }
                    }
                }
            }
        }

        Ok(discovery)
    }

    /// Tail one pod's logs since `now - lookback`
    pub async fn fetch_logs(
        &self,
        creds: &CredentialHandle,
        pod: &PodRef,
        window: LogWindow,
    ) -> Result<Vec<String>> {
        let since = Utc::now() - ChronoDuration::minutes(i64::from(window.lookback_minutes));
        let since = since.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let tail = window.max_lines.to_string();

        let args = creds.command(&[
            "logs",
            &pod.name,
            "-n",
            &pod.namespace,
            "--since-time",
            &since,
            "--tail",
            &tail,
            "--timestamps",
        ]);
        let output = self.runner.run(&args).await?;

        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Fetch and filter logs for every pod, isolating per-pod failures
    pub async fn collect_logs(
        &self,
        creds: &CredentialHandle,
        pods: &[PodRef],
        window: LogWindow,
        filter: &LogFilter,
    ) -> CollectedLogs {
        // Each fetch owns its pod so the futures carry no per-item borrow
        let fetches: Vec<_> = pods
            .iter()
            .cloned()
            .map(|pod| async move {
                let result = self.fetch_logs(creds, &pod, window).await;
                (pod, result)
            })
            .collect();

        // `buffered` yields in input order, which keeps discovery order
        let results: Vec<(PodRef, Result<Vec<String>>)> = stream::iter(fetches)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut collected = CollectedLogs::default();
        for (pod, result) in results {
            match result {
                Ok(lines) => {
                    let lines = filter.apply(lines);
                    if lines.is_empty() {
                        continue;
                    }
                    collected.contributions.push((pod, lines.len()));
                    collected.logs.extend(lines);
                }
                Err(e) => {
                    let message = format!("Failed to scan pod {pod}: {e}");
                    error!(pod = %pod, error = %e, "Pod log retrieval failed");
                    collected.errors.push(message);
                }
            }
        }

        collected
    }

    /// Contexts in the ambient kubeconfig
    pub async fn list_contexts(&self) -> Result<Vec<ClusterContext>> {
        let args = CredentialHandle::ambient().command(&["config", "get-contexts"]);
        let output = self.runner.run(&args).await?;
        Ok(parse_contexts(&output))
    }

    /// Namespaces of the cluster behind `context`
    pub async fn list_namespaces(&self, context: &str) -> Result<Vec<String>> {
        let creds = CredentialHandle::ambient().with_context(Some(context.to_string()));
        let args = creds.command(&["get", "namespaces", "-o", "json"]);
        let output = self.runner.run(&args).await?;
        parse_namespace_list(&output)
    }
}
