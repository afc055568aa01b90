//! Collector tests against a scripted kubectl

use super::*;
use async_trait::async_trait;
use crate::testing::{arg_after, pod_list, ScriptedRunner};
use std::time::Duration;

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn window() -> LogWindow {
    LogWindow {
        lookback_minutes: 30,
        max_lines: 50,
    }
}

#[tokio::test]
async fn test_isolated_namespace_failure_is_recorded() {
    let runner = ScriptedRunner::new(|args| match arg_after(args, "-n") {
        Some("shop") => Ok(pod_list("shop", &[("api", "Running"), ("old", "Succeeded")])),
        Some(ns) => Err(OrchestratorError::Resource(format!(
            "kubectl command failed: namespaces \"{ns}\" is forbidden"
        ))),
        None => unreachable!(),
    });
    let collector = LogCollector::new(runner.clone());

    let discovery = collector
        .discover_pods(
            &CredentialHandle::ambient(),
            &strings(&["locked", "shop"]),
            None,
            NamespaceFailurePolicy::Isolate,
        )
        .await
        .unwrap();

    assert_eq!(discovery.pods, vec![PodRef::new("shop", "api")]);
    assert_eq!(discovery.errors.len(), 1);
    assert!(discovery.errors[0].starts_with("Failed to list pods in namespace locked"));
    assert_eq!(runner.call_count(), 2);
}

#[tokio::test]
async fn test_propagated_namespace_failure_fails_discovery() {
    let runner = ScriptedRunner::new(|_| {
        Err(OrchestratorError::Resource("kubectl command timed out".to_string()))
    });
    let collector = LogCollector::new(runner);

    let result = collector
        .discover_pods(
            &CredentialHandle::ambient(),
            &strings(&["default"]),
            None,
            NamespaceFailurePolicy::Propagate,
        )
        .await;

    assert!(matches!(result, Err(OrchestratorError::Resource(_))));
}

#[tokio::test]
async fn test_per_pod_failure_is_isolated() {
    let runner = ScriptedRunner::new(|args| match args.get(1).map(String::as_str) {
        Some("pod-a") => Ok("2024-05-01T10:00:00Z ERROR a failed\n".to_string()),
        Some("pod-b") => Err(OrchestratorError::Resource(
            "kubectl command failed: container is waiting".to_string(),
        )),
        Some("pod-c") => Ok("2024-05-01T10:00:01Z ERROR c failed\n\n".to_string()),
        other => panic!("unexpected call {other:?}"),
    });
    let collector = LogCollector::new(runner);
    let pods = vec![
        PodRef::new("shop", "pod-a"),
        PodRef::new("shop", "pod-b"),
        PodRef::new("shop", "pod-c"),
    ];

    let collected = collector
        .collect_logs(
            &CredentialHandle::ambient(),
            &pods,
            window(),
            &LogFilter::new(strings(&["ERROR"]), vec![]),
        )
        .await;

    assert_eq!(collected.logs.len(), 2);
    assert_eq!(collected.pods_scanned(), vec!["shop/pod-a", "shop/pod-c"]);
    assert_eq!(collected.errors.len(), 1);
    assert!(collected.errors[0].starts_with("Failed to scan pod shop/pod-b: "));
    assert!(collected.errors[0].contains("container is waiting"));
}

#[tokio::test]
async fn test_pods_without_matching_lines_are_not_listed() {
    let runner = ScriptedRunner::new(|args| match args.get(1).map(String::as_str) {
        Some("quiet") => Ok("2024-05-01T10:00:00Z INFO all good\n".to_string()),
        _ => Ok("2024-05-01T10:00:00Z WARN disk 91% full\n".to_string()),
    });
    let collector = LogCollector::new(runner);
    let pods = vec![PodRef::new("ops", "quiet"), PodRef::new("ops", "noisy")];

    let collected = collector
        .collect_logs(
            &CredentialHandle::ambient(),
            &pods,
            window(),
            &LogFilter::new(strings(&["WARN", "ERROR"]), vec![]),
        )
        .await;

    assert_eq!(collected.pods_scanned(), vec!["ops/noisy"]);
    assert_eq!(collected.lines_per_namespace().get("ops"), Some(&1));
}

/// Answers the first pod slowest so completion order differs from input order
struct SlowFirstRunner;

#[async_trait]
impl CommandRunner for SlowFirstRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        let pod = args.get(1).cloned().unwrap_or_default();
        let delay = if pod == "first" { 80 } else { 5 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(format!("ERROR from {pod}\n"))
    }
}

#[tokio::test]
async fn test_discovery_order_survives_parallel_fetch() {
    let collector = LogCollector::new(Arc::new(SlowFirstRunner)).with_concurrency(4);
    let pods = vec![
        PodRef::new("a", "first"),
        PodRef::new("a", "second"),
        PodRef::new("b", "third"),
    ];

    let collected = collector
        .collect_logs(&CredentialHandle::ambient(), &pods, window(), &LogFilter::default())
        .await;

    assert_eq!(collected.pods_scanned(), vec!["a/first", "a/second", "b/third"]);
    assert_eq!(collected.logs[0], "ERROR from first");
}

#[tokio::test]
async fn test_collection_runs_on_a_spawned_task() {
    let collector = Arc::new(LogCollector::new(Arc::new(SlowFirstRunner)).with_concurrency(2));
    let pods = vec![PodRef::new("a", "first"), PodRef::new("a", "second")];

    let handle = tokio::spawn({
        let collector = Arc::clone(&collector);
        async move {
            let creds = CredentialHandle::ambient();
            collector
                .collect_logs(&creds, &pods, window(), &LogFilter::default())
                .await
        }
    });
    let collected = handle.await.unwrap();

    assert_eq!(collected.pods_scanned(), vec!["a/first", "a/second"]);
}

#[tokio::test]
async fn test_fetch_logs_arguments() {
    let runner = ScriptedRunner::new(|_| Ok(String::new()));
    let collector = LogCollector::new(runner.clone());
    let creds = CredentialHandle::ambient().with_context(Some("prod".to_string()));

    let lines = collector
        .fetch_logs(&creds, &PodRef::new("payments", "api-0"), window())
        .await
        .unwrap();
    assert!(lines.is_empty());

    let args = &runner.calls()[0];
    assert_eq!(&args[..4], &strings(&["logs", "api-0", "-n", "payments"])[..]);
    assert_eq!(arg_after(args, "--tail"), Some("50"));
    assert_eq!(arg_after(args, "--context"), Some("prod"));
    assert!(args.contains(&"--timestamps".to_string()));

    let since = arg_after(args, "--since-time").unwrap();
    let parsed = chrono::NaiveDateTime::parse_from_str(since, "%Y-%m-%dT%H:%M:%SZ").unwrap();
    let age = Utc::now().naive_utc() - parsed;
    assert!(age >= ChronoDuration::minutes(29) && age <= ChronoDuration::minutes(31));
}

#[tokio::test]
async fn test_list_pods_applies_selector() {
    let runner = ScriptedRunner::new(|_| {
        Ok(pod_list("web", &[("frontend", "Running"), ("backend", "Running")]))
    });
    let collector = LogCollector::new(runner);
    let selector = BTreeMap::from([("app".to_string(), "backend".to_string())]);

    let pods = collector
        .list_pods(&CredentialHandle::ambient(), "web", Some(&selector))
        .await
        .unwrap();
    assert_eq!(pods, vec![PodRef::new("web", "backend")]);
}

#[tokio::test]
async fn test_list_namespaces_uses_context() {
    let runner = ScriptedRunner::new(|_| {
        Ok(r#"{"items": [{"metadata": {"name": "default"}}]}"#.to_string())
    });
    let collector = LogCollector::new(runner.clone());

    let namespaces = collector.list_namespaces("kind-dev").await.unwrap();
    assert_eq!(namespaces, vec!["default"]);
    assert_eq!(arg_after(&runner.calls()[0], "--context"), Some("kind-dev"));
}

#[test]
fn test_policy_parsing() {
    assert_eq!(
        "Propagate".parse::<NamespaceFailurePolicy>().unwrap(),
        NamespaceFailurePolicy::Propagate
    );
    assert_eq!(
        NamespaceFailurePolicy::default(),
        NamespaceFailurePolicy::Isolate
    );
    assert!("ignore".parse::<NamespaceFailurePolicy>().is_err());
}
