//! Incident Orchestrator - log scanning and incident escalation service
//!
//! Serves the scan, job, incident, webhook and config API and wires the
//! library components together from `ORCH_*` settings.

use anyhow::Result;
use incident_orchestrator::{api, config::OrchestratorConfig};
use orchestrator_lib::{
    collector::{KubectlRunner, LogCollector},
    config_store::ConfigStore,
    health::{DependencyProbe, HealthRegistry},
    jobs::JobManager,
    observability::{OrchestratorMetrics, StructuredLogger},
    pipeline::AnalysisPipeline,
    ratelimit::SlidingWindowLimiter,
    scan::{ScanConfig, ScanService},
    tickets::TicketProvider,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting incident-orchestrator");

    let config = OrchestratorConfig::load()?;
    info!(
        instance = %config.instance,
        config_path = %config.config_path.display(),
        "Orchestrator configured"
    );

    let health = HealthRegistry::with_default_components().await;
    let metrics = OrchestratorMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    let client = reqwest::Client::new();

    let store = Arc::new(ConfigStore::new(&config.config_path));
    // Creates the file with defaults on first start
    store.get();

    let tickets = TicketProvider::Settings {
        client: client.clone(),
        store: Arc::clone(&store),
        health: Some(health.clone()),
    };

    let runner = Arc::new(KubectlRunner::new(config.kubectl_timeout()));
    let scans = ScanService::new(Arc::clone(&store), runner.clone(), client.clone())
        .with_collector(LogCollector::new(runner).with_concurrency(config.pod_concurrency))
        .with_pipeline(
            AnalysisPipeline::new(client.clone())
                .with_stage_timeout(config.stage_timeout())
                .with_health(health.clone())
                .with_logger(logger.clone()),
        )
        .with_incident_sink(Arc::new(tickets.clone()))
        .with_jobs(JobManager::new(config.job_retention()))
        .with_config(ScanConfig {
            namespace_policy: config.namespace_policy,
            escalation_timeout: config.escalation_timeout(),
        })
        .with_logger(logger.clone())
        .with_health(health.clone());

    let state = Arc::new(api::AppState {
        scans: Arc::new(scans),
        limiter: Arc::new(SlidingWindowLimiter::new(
            config.rate_limit,
            config.rate_period(),
        )),
        store,
        tickets,
        health,
        probe: DependencyProbe::new(client),
        metrics,
    });

    logger.log_startup(ORCHESTRATOR_VERSION, config.port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    api::serve(config.port, state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
