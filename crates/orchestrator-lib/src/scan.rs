//! Scan orchestration
//!
//! Validation, credentials, pod discovery, log collection, analysis and
//! escalation for one request, run inline or as a background job.

use crate::collector::{
    setup_credentials, CommandRunner, LogCollector, LogFilter, LogWindow, NamespaceFailurePolicy,
};
use crate::config_store::{ConfigStore, ServiceConfig};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::jobs::{JobManager, JobView};
use crate::models::{ScanRequest, ScanResult};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::pipeline::{
    escalate, AnalysisPipeline, HttpIncidentSink, IncidentSink, PipelineEndpoints, StageOutcome,
    DEFAULT_ESCALATION_TIMEOUT,
};
use crate::tickets::TicketProvider;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Tunables for scan execution
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub namespace_policy: NamespaceFailurePolicy,
    pub escalation_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            namespace_policy: NamespaceFailurePolicy::default(),
            escalation_timeout: DEFAULT_ESCALATION_TIMEOUT,
        }
    }
}

/// Runs scans against clusters and tracks the asynchronous ones
pub struct ScanService {
    store: Arc<ConfigStore>,
    collector: LogCollector,
    pipeline: AnalysisPipeline,
    incident_sink: Arc<dyn IncidentSink>,
    client: reqwest::Client,
    jobs: JobManager<ScanResult>,
    config: ScanConfig,
    metrics: OrchestratorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl ScanService {
    /// Service escalating through the in-process ticket manager
    pub fn new(
        store: Arc<ConfigStore>,
        runner: Arc<dyn CommandRunner>,
        client: reqwest::Client,
    ) -> Self {
        let tickets = TicketProvider::Settings {
            client: client.clone(),
            store: Arc::clone(&store),
            health: None,
        };

        Self {
            store,
            collector: LogCollector::new(runner),
            pipeline: AnalysisPipeline::new(client.clone()),
            incident_sink: Arc::new(tickets),
            client,
            jobs: JobManager::default(),
            config: ScanConfig::default(),
            metrics: OrchestratorMetrics::new(),
            logger: StructuredLogger::new("scan"),
            health: None,
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_collector(mut self, collector: LogCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_pipeline(mut self, pipeline: AnalysisPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sink for critical incidents when no remote integrator is configured
    pub fn with_incident_sink(mut self, sink: Arc<dyn IncidentSink>) -> Self {
        self.incident_sink = sink;
        self
    }

    pub fn with_jobs(mut self, jobs: JobManager<ScanResult>) -> Self {
        self.jobs = jobs;
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

    pub fn collector(&self) -> &LogCollector {
        &self.collector
    }

    pub fn jobs(&self) -> &JobManager<ScanResult> {
        &self.jobs
    }

    /// Run a scan to completion
    ///
    /// Validation failures return before any credential, process or network
    /// use. Pod and analysis failures are recorded in the result.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        request.validate()?;
        self.execute(request).await
    }

    /// Validate now, scan in the background, return the job id
    pub fn submit(self: &Arc<Self>, request: ScanRequest) -> Result<String> {
        request.validate()?;

        let service = Arc::clone(self);
        self.jobs
            .submit(async move { service.execute(&request).await })
    }

    pub fn poll(&self, job_id: &str) -> Option<JobView<ScanResult>> {
        self.jobs.poll(job_id)
    }

    async fn execute(&self, request: &ScanRequest) -> Result<ScanResult> {
        let started = Instant::now();
        let target = &request.cluster_config;
        let config = self.store.get();

        let creds = setup_credentials(target).await?;

        let discovery = self
            .collector
            .discover_pods(
                &creds,
                &request.namespaces,
                request.pod_labels.as_ref(),
                self.config.namespace_policy,
            )
            .await;
        let discovery = self.track_kubectl(discovery).await?;
        debug!(cluster = %target.name, pods = discovery.pods.len(), "Discovered pods");

        let window = LogWindow {
            lookback_minutes: request.time_range_minutes,
            max_lines: request.max_lines_per_pod,
        };
        let filter = LogFilter::new(
            request.log_levels.clone(),
            request.search_patterns.clone().unwrap_or_default(),
        );
        let collected = self
            .collector
            .collect_logs(&creds, &discovery.pods, window, &filter)
            .await;
        drop(creds);

        for (namespace, lines) in collected.lines_per_namespace() {
            self.metrics
                .add_logs_scanned(&target.name, &namespace, lines as u64);
        }

        let mut errors = discovery.errors;
        errors.extend(collected.errors.iter().cloned());

        let mut result = ScanResult {
            cluster_name: target.name.clone(),
            total_logs: collected.logs.len(),
            pods_scanned: collected.pods_scanned(),
            logs: collected.logs,
            scan_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            errors,
            incident_analysis: None,
            incident_integration: None,
        };

        if !result.logs.is_empty() {
            let analysis_started = Instant::now();
            let analysis = self
                .pipeline
                .run(&PipelineEndpoints::from(&config), &result.logs)
                .await;
            self.metrics
                .observe_analysis_latency("scan", analysis_started.elapsed().as_secs_f64());

            if config.enable_incident_integration {
                let sink = self.incident_sink_for(&config);
                result.incident_integration =
                    escalate(sink.as_ref(), &analysis, self.config.escalation_timeout).await;

                if let (Some(outcome), Some(root_cause)) =
                    (&result.incident_integration, analysis.root_cause())
                {
                    match outcome {
                        StageOutcome::Ok(ticket) => self
                            .logger
                            .log_escalation(root_cause, Ok(ticket.ticket_key.as_str())),
                        StageOutcome::Failed(e) => {
                            self.logger.log_escalation(root_cause, Err(e.error.as_str()))
                        }
                    }
                }
            }
            result.incident_analysis = Some(analysis);
        } else {
            info!(cluster = %target.name, "No matching log lines, skipping analysis");
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_scan_latency("scan", elapsed);
        self.logger.log_scan_completed(
            &result.cluster_name,
            None,
            result.total_logs,
            result.pods_scanned.len(),
            result.errors.len(),
            elapsed,
        );

        Ok(result)
    }

    fn incident_sink_for(&self, config: &ServiceConfig) -> Arc<dyn IncidentSink> {
        let url = config.incident_integrator_url.trim();
        if url.is_empty() {
            Arc::clone(&self.incident_sink)
        } else {
            Arc::new(HttpIncidentSink::new(self.client.clone(), url))
        }
    }

    async fn track_kubectl<T>(&self, result: Result<T>) -> Result<T> {
        if let Some(health) = &self.health {
            match &result {
                Ok(_) => health.record_success(components::KUBECTL).await,
                Err(e) => health.record_failure(components::KUBECTL, e.to_string()).await,
            }
        }
        result
    }
}
