//! Parsing of kubectl discovery output

use crate::error::Result;
use crate::models::PodRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    metadata: ObjectMeta,
}

/// True when every selector pair is present on the pod with the same value
pub fn labels_match(
    labels: &BTreeMap<String, String>,
    selector: Option<&BTreeMap<String, String>>,
) -> bool {
    selector
        .map(|wanted| wanted.iter().all(|(k, v)| labels.get(k) == Some(v)))
        .unwrap_or(true)
}

/// Running pods from `kubectl get pods -o json` matching the selector
pub fn parse_pod_list(
    output: &str,
    namespace: &str,
    selector: Option<&BTreeMap<String, String>>,
) -> Result<Vec<PodRef>> {
    let list: ObjectList<Pod> = serde_json::from_str(output)?;

    Ok(list
        .items
        .into_iter()
        .filter(|pod| pod.status.phase.as_deref() == Some("Running"))
        .filter(|pod| labels_match(&pod.metadata.labels, selector))
        .map(|pod| {
            let ns = pod
                .metadata
                .namespace
                .unwrap_or_else(|| namespace.to_string());
            PodRef::new(ns, pod.metadata.name)
        })
        .collect())
}

/// Namespace names from `kubectl get namespaces -o json`
pub fn parse_namespace_list(output: &str) -> Result<Vec<String>> {
    let list: ObjectList<Namespace> = serde_json::from_str(output)?;
    Ok(list.items.into_iter().map(|ns| ns.metadata.name).collect())
}

/// A kubeconfig context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterContext {
    /// Display name: last path segment of the cluster reference
    pub name: String,
    pub context: String,
    pub cluster: String,
    pub user: String,
}

/// Parse the table printed by `kubectl config get-contexts`
pub fn parse_contexts(output: &str) -> Vec<ClusterContext> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim_start().trim_start_matches('*');
            let mut fields = line.split_whitespace();
            let context = fields.next()?;
            let cluster = fields.next()?;
            let user = fields.next().unwrap_or(cluster);
            let name = cluster.rsplit('/').next().unwrap_or(cluster);
            Some(ClusterContext {
                name: name.to_string(),
                context: context.to_string(),
                cluster: cluster.to_string(),
                user: user.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PODS: &str = r#"{
        "items": [
            {"metadata": {"name": "api-1", "namespace": "shop", "labels": {"app": "api", "tier": "web"}},
             "status": {"phase": "Running"}},
            {"metadata": {"name": "api-2", "namespace": "shop", "labels": {"app": "api"}},
             "status": {"phase": "Pending"}},
            {"metadata": {"name": "worker-1", "namespace": "shop", "labels": {"app": "worker"}},
             "status": {"phase": "Running"}},
            {"metadata": {"name": "bare", "namespace": "shop"},
             "status": {"phase": "Running"}}
        ]
    }"#;

    #[test]
    fn test_only_running_pods_kept() {
        let pods = parse_pod_list(PODS, "shop", None).unwrap();
        let names: Vec<_> = pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["api-1", "worker-1", "bare"]);
    }

    #[test]
    fn test_selector_requires_superset() {
        let selector = BTreeMap::from([("app".to_string(), "api".to_string())]);
        let pods = parse_pod_list(PODS, "shop", Some(&selector)).unwrap();
        assert_eq!(pods, vec![PodRef::new("shop", "api-1")]);

        let selector = BTreeMap::from([
            ("app".to_string(), "api".to_string()),
            ("tier".to_string(), "db".to_string()),
        ]);
        assert!(parse_pod_list(PODS, "shop", Some(&selector)).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_pod_list() {
        assert!(parse_pod_list("not json", "shop", None).is_err());
        assert!(parse_pod_list("{}", "shop", None).unwrap().is_empty());
    }

    #[test]
    fn test_namespaces() {
        let out = r#"{"items": [{"metadata": {"name": "default"}}, {"metadata": {"name": "kube-system"}}]}"#;
        assert_eq!(parse_namespace_list(out).unwrap(), vec!["default", "kube-system"]);
    }

    #[test]
    fn test_contexts_table() {
        let table = "\
CURRENT   NAME                                              CLUSTER                                           AUTHINFO                                          NAMESPACE
*         arn:aws:eks:eu-west-1:123:cluster/prod            arn:aws:eks:eu-west-1:123:cluster/prod            arn:aws:eks:eu-west-1:123:cluster/prod
          kind-dev                                          kind-dev                                          kind-dev                                          default
";
        let contexts = parse_contexts(table);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].name, "prod");
        assert_eq!(contexts[0].context, "arn:aws:eks:eu-west-1:123:cluster/prod");
        assert_eq!(contexts[1].name, "kind-dev");
        assert_eq!(contexts[1].user, "kind-dev");
    }
}
