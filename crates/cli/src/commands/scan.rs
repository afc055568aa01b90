//! Log scan CLI commands

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::client::{ApiClient, ClusterConfig, JobAccepted, JobStatus, ScanRequest, ScanResponse};
use crate::output::{
    color_root_cause, color_status, format_timestamp, print_info, print_json, print_success,
    print_warning, OutputFormat,
};

const DEFAULT_LOG_LEVELS: [&str; 3] = ["ERROR", "WARN", "CRITICAL"];

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ClusterKind {
    Eks,
    Gke,
}

impl ClusterKind {
    fn as_str(self) -> &'static str {
        match self {
            ClusterKind::Eks => "eks",
            ClusterKind::Gke => "gke",
        }
    }
}

/// Scope of a log scan
#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Cluster name
    pub cluster: String,

    /// Cluster flavour
    #[arg(long = "type", value_enum, default_value = "eks")]
    pub cluster_type: ClusterKind,

    /// Kubeconfig file uploaded with the request
    #[arg(long)]
    pub kubeconfig_file: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// API server URL override
    #[arg(long)]
    pub cluster_url: Option<String>,

    /// Namespace to scan (repeatable, default: default)
    #[arg(long = "namespace", short)]
    pub namespaces: Vec<String>,

    /// Pod label selector as KEY=VALUE (repeatable)
    #[arg(long = "label", short, value_parser = parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// How far back to read logs
    #[arg(long, default_value_t = 60)]
    pub since_minutes: u32,

    /// Log level to keep (repeatable, default: ERROR WARN CRITICAL)
    #[arg(long = "level")]
    pub levels: Vec<String>,

    /// Substring that selects a line regardless of level (repeatable)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Lines read per pod
    #[arg(long, default_value_t = 1000)]
    pub max_lines: u32,
}

/// Parse `KEY=VALUE`
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl ScanArgs {
    /// Build the request body, reading and encoding the kubeconfig file if given
    pub fn to_request(&self) -> Result<ScanRequest> {
        let kubeconfig = match &self.kubeconfig_file {
            Some(path) => {
                let raw = std::fs::read(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                Some(base64::engine::general_purpose::STANDARD.encode(raw))
            }
            None => None,
        };

        let namespaces = if self.namespaces.is_empty() {
            vec!["default".to_string()]
        } else {
            self.namespaces.clone()
        };

        let log_levels = if self.levels.is_empty() {
            DEFAULT_LOG_LEVELS.iter().map(|l| l.to_string()).collect()
        } else {
            self.levels.iter().map(|l| l.to_uppercase()).collect()
        };

        let pod_labels = (!self.labels.is_empty()).then(|| {
            self.labels
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<_, _>>()
        });

        Ok(ScanRequest {
            cluster_config: ClusterConfig {
                name: self.cluster.clone(),
                cluster_type: self.cluster_type.as_str().to_string(),
                kubeconfig,
                context: self.context.clone(),
                cluster_url: self.cluster_url.clone(),
            },
            namespaces,
            pod_labels,
            time_range_minutes: self.since_minutes,
            log_levels,
            search_patterns: (!self.patterns.is_empty()).then(|| self.patterns.clone()),
            max_lines_per_pod: self.max_lines,
        })
    }
}

/// Run a scan and wait for its result
pub async fn scan(
    client: &ApiClient,
    args: &ScanArgs,
    show_logs: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = args.to_request()?;
    let result: ScanResponse = client.post("scan-logs", &request).await?;
    print_scan(&result, show_logs, format)
}

/// Submit a scan as a background job
pub async fn submit(client: &ApiClient, args: &ScanArgs, format: OutputFormat) -> Result<()> {
    let request = args.to_request()?;
    let accepted: JobAccepted = client.post("scan-logs-async", &request).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "job_id": accepted.job_id }))?,
        OutputFormat::Table => {
            print_success(&format!("Scan submitted as job {}", accepted.job_id.cyan()));
            print_info(&format!("Poll with: irctl job {}", accepted.job_id));
        }
    }
    Ok(())
}

/// Show a job, optionally polling until it finishes
pub async fn job(
    client: &ApiClient,
    job_id: &str,
    wait: bool,
    interval: Duration,
    timeout: Duration,
    show_logs: bool,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("scan-logs-job/{}", job_id);
    let started = Instant::now();

    let status = loop {
        let status: JobStatus = client.get(&path).await?;
        if !wait || !matches!(status, JobStatus::Pending) {
            break status;
        }
        if started.elapsed() >= timeout {
            anyhow::bail!("job {} still pending after {}s", job_id, timeout.as_secs());
        }
        tokio::time::sleep(interval).await;
    };

    if let OutputFormat::Json = format {
        return print_json(&status);
    }

    println!("Job:    {}", job_id.cyan());
    println!("Status: {}", color_status(status.label()));
    match status {
        JobStatus::Pending => print_info("Scan is still running"),
        JobStatus::Error { error } => print_warning(&error),
        JobStatus::Complete { result } => {
            println!();
            print_scan(&result, show_logs, format)?;
        }
    }
    Ok(())
}

fn print_scan(result: &ScanResponse, show_logs: bool, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(result);
    }

    println!("{}", "Scan Result".bold());
    println!("{}", "=".repeat(50));
    println!("Cluster:      {}", result.cluster_name.cyan());
    println!("Scanned at:   {}", format_timestamp(&result.scan_time));
    println!("Log lines:    {}", result.total_logs);
    println!("Pods:         {}", result.pods_scanned.len());
    for pod in &result.pods_scanned {
        println!("  - {}", pod);
    }

    for error in &result.errors {
        print_warning(error);
    }

    let escalated = result.incident_integration.is_some();
    match result.root_cause() {
        Some(cause) => println!("Root cause:   {}", color_root_cause(cause, escalated)),
        None if result.incident_analysis.is_some() => {
            println!("Root cause:   {}", "unavailable".dimmed())
        }
        None => {}
    }

    if let Some(integration) = &result.incident_integration {
        match integration.get("jira_issue").and_then(Value::as_str) {
            Some(key) => {
                let status = integration
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("created");
                println!("Ticket:       {} ({})", key.cyan(), color_status(status));
                if let Some(owner) = integration.get("assigned_to").and_then(Value::as_str) {
                    println!("Assigned to:  {}", owner);
                }
            }
            None => {
                let error = integration
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                print_warning(&format!("Escalation failed: {}", error));
            }
        }
    }

    if show_logs && !result.logs.is_empty() {
        println!();
        println!("{}", "Logs".bold());
        println!("{}", "-".repeat(50));
        for line in &result.logs {
            println!("{}", line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(cluster: &str) -> ScanArgs {
        ScanArgs {
            cluster: cluster.to_string(),
            cluster_type: ClusterKind::Gke,
            kubeconfig_file: None,
            context: None,
            cluster_url: None,
            namespaces: Vec::new(),
            labels: Vec::new(),
            since_minutes: 60,
            levels: Vec::new(),
            patterns: Vec::new(),
            max_lines: 1000,
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("app=api").unwrap(),
            ("app".to_string(), "api".to_string())
        );
        assert_eq!(
            parse_key_value("tier=a=b").unwrap(),
            ("tier".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = args("prod").to_request().unwrap();
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["cluster_config"]["name"], "prod");
        assert_eq!(body["cluster_config"]["type"], "gke");
        assert!(body["cluster_config"].get("kubeconfig").is_none());
        assert_eq!(body["namespaces"], serde_json::json!(["default"]));
        assert_eq!(body["log_levels"], serde_json::json!(["ERROR", "WARN", "CRITICAL"]));
        assert!(body.get("pod_labels").is_none());
        assert!(body.get("search_patterns").is_none());
        assert_eq!(body["max_lines_per_pod"], 1000);
    }

    #[test]
    fn test_request_scope() {
        let mut scan = args("prod");
        scan.namespaces = vec!["payments".to_string(), "web".to_string()];
        scan.labels = vec![("app".to_string(), "api".to_string())];
        scan.levels = vec!["error".to_string()];
        scan.patterns = vec!["OOMKilled".to_string()];

        let body = serde_json::to_value(scan.to_request().unwrap()).unwrap();
        assert_eq!(body["namespaces"], serde_json::json!(["payments", "web"]));
        assert_eq!(body["pod_labels"], serde_json::json!({"app": "api"}));
        assert_eq!(body["log_levels"], serde_json::json!(["ERROR"]));
        assert_eq!(body["search_patterns"], serde_json::json!(["OOMKilled"]));
    }

    #[test]
    fn test_kubeconfig_file_is_encoded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "apiVersion: v1\nkind: Config\n").unwrap();

        let mut scan = args("prod");
        scan.kubeconfig_file = Some(file.path().to_path_buf());
        let request = scan.to_request().unwrap();

        let encoded = request.cluster_config.kubeconfig.unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"apiVersion: v1\nkind: Config\n");
    }

    #[test]
    fn test_missing_kubeconfig_file() {
        let mut scan = args("prod");
        scan.kubeconfig_file = Some(PathBuf::from("/nonexistent/kubeconfig"));
        let err = scan.to_request().unwrap_err();
        assert!(err.to_string().contains("Failed to read kubeconfig"));
    }
}
