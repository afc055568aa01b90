//! HTTP API: scans, jobs, incidents, webhooks, config, health and metrics

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use orchestrator_lib::{
    collector::ClusterContext,
    config_store::{mask_secrets, ConfigPatch, ConfigStore},
    health::{ComponentStatus, DependencyProbe, HealthRegistry},
    observability::OrchestratorMetrics,
    ratelimit::SlidingWindowLimiter,
    scan::ScanService,
    tickets::{IntegrationSettings, PullRequestEvent, TicketProvider},
    webhook, IncidentEvent, IncidentOutcome, OrchestratorError, ScanRequest, ScanResult,
    WebhookAck,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scans: Arc<ScanService>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub store: Arc<ConfigStore>,
    pub tickets: TicketProvider,
    pub health: HealthRegistry,
    pub probe: DependencyProbe,
    pub metrics: OrchestratorMetrics,
}

/// Error body `{error}` with a status derived from the error kind
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OrchestratorError::Validation(_) | OrchestratorError::Json(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            OrchestratorError::Unauthorized(_) => StatusCode::FORBIDDEN,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

impl AppState {
    /// Count a failed request and wrap the error
    fn reject(&self, endpoint: &str, e: OrchestratorError) -> ApiError {
        match &e {
            OrchestratorError::RateLimited => self.metrics.inc_rate_limited(endpoint),
            OrchestratorError::Validation(_) | OrchestratorError::Json(_) => {
                self.metrics.inc_validation_errors(endpoint)
            }
            _ => self.metrics.inc_errors(endpoint),
        }
        ApiError(e)
    }

    fn admit(&self, endpoint: &str, client: &str) -> Result<(), ApiError> {
        self.metrics.inc_requests(endpoint);
        if self.limiter.admit(client) {
            Ok(())
        } else {
            warn!(client = %client, endpoint = %endpoint, "Rate limit exceeded");
            Err(self.reject(endpoint, OrchestratorError::RateLimited))
        }
    }
}

/// Rate-limit identity: first `X-Forwarded-For` hop, else the peer address
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, OrchestratorError> {
    serde_json::from_slice(body)
        .map_err(|e| OrchestratorError::Validation(format!("malformed request body: {e}")))
}

async fn scan_logs(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ScanResult> {
    const ENDPOINT: &str = "scan-logs";
    state.admit(ENDPOINT, &client_id(&headers, peer.map(|ConnectInfo(addr)| addr)))?;

    let started = Instant::now();
    let request: ScanRequest = parse_body(&body).map_err(|e| state.reject(ENDPOINT, e))?;
    let result = state
        .scans
        .scan(&request)
        .await
        .map_err(|e| state.reject(ENDPOINT, e))?;

    state
        .metrics
        .observe_scan_latency(ENDPOINT, started.elapsed().as_secs_f64());
    Ok(Json(result))
}

#[derive(Serialize)]
struct JobAccepted {
    job_id: String,
}

async fn scan_logs_async(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<JobAccepted> {
    const ENDPOINT: &str = "scan-logs-async";
    state.admit(ENDPOINT, &client_id(&headers, peer.map(|ConnectInfo(addr)| addr)))?;

    let request: ScanRequest = parse_body(&body).map_err(|e| state.reject(ENDPOINT, e))?;
    let job_id = state
        .scans
        .submit(request)
        .map_err(|e| state.reject(ENDPOINT, e))?;
    Ok(Json(JobAccepted { job_id }))
}

async fn scan_logs_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    const ENDPOINT: &str = "scan-logs-job";
    state.metrics.inc_requests(ENDPOINT);

    match state.scans.poll(&job_id) {
        Some(view) => Ok(Json(view).into_response()),
        None => Err(state.reject(ENDPOINT, OrchestratorError::NotFound(format!("job {job_id}")))),
    }
}

async fn report_incident(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<IncidentOutcome> {
    const ENDPOINT: &str = "incident";
    state.metrics.inc_requests(ENDPOINT);

    let event: IncidentEvent = parse_body(&body).map_err(|e| state.reject(ENDPOINT, e))?;
    let manager = state.tickets.manager().map_err(|e| state.reject(ENDPOINT, e))?;
    let outcome = manager
        .create_or_dedup(&event)
        .await
        .map_err(|e| state.reject(ENDPOINT, e))?;
    Ok(Json(outcome))
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    const ENDPOINT: &str = "github-webhook";
    state.metrics.inc_requests(ENDPOINT);

    // Verified on the exact bytes received, before any parsing
    let secret = IntegrationSettings::resolve(&state.store.get()).webhook_secret;
    let signature = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    webhook::authorize(&body, &secret, signature).map_err(|e| state.reject(ENDPOINT, e))?;

    // Any verified delivery is acknowledged, including events that are not pull requests
    let event: PullRequestEvent = match parse_body(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Ignoring webhook payload that is not a pull request event");
            return Ok(Json(WebhookAck::ok()));
        }
    };
    if event.merged_pull_request().is_none() {
        return Ok(Json(WebhookAck::ok()));
    }

    match state.tickets.manager() {
        Ok(manager) => {
            let closed = manager.close_from_merge(&event).await;
            info!(closed = ?closed, "Processed merged pull request");
        }
        Err(e) => {
            state.metrics.inc_errors(ENDPOINT);
            warn!(error = %e, "Ticket manager unavailable, merged pull request ignored");
        }
    }
    Ok(Json(WebhookAck::ok()))
}

#[derive(Serialize)]
struct ClusterList {
    clusters: Vec<ClusterContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn clusters(State(state): State<Arc<AppState>>) -> Json<ClusterList> {
    state.metrics.inc_requests("clusters");
    match state.scans.collector().list_contexts().await {
        Ok(clusters) => Json(ClusterList {
            clusters,
            error: None,
        }),
        Err(e) => {
            warn!(error = %e, "Failed to list kubeconfig contexts");
            Json(ClusterList {
                clusters: Vec::new(),
                error: Some(e.to_string()),
            })
        }
    }
}

#[derive(Serialize)]
struct NamespaceList {
    namespaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn namespaces(
    State(state): State<Arc<AppState>>,
    Path(cluster): Path<String>,
) -> Json<NamespaceList> {
    state.metrics.inc_requests("namespaces");
    match state.scans.collector().list_namespaces(&cluster).await {
        Ok(namespaces) => Json(NamespaceList {
            namespaces,
            error: None,
        }),
        Err(e) => {
            warn!(cluster = %cluster, error = %e, "Failed to list namespaces");
            Json(NamespaceList {
                namespaces: Vec::new(),
                error: Some(e.to_string()),
            })
        }
    }
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Map<String, Value>> {
    state.metrics.inc_requests("config");
    Json(state.store.masked())
}

async fn update_config(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Value> {
    const ENDPOINT: &str = "config";
    state.metrics.inc_requests(ENDPOINT);

    let patch: ConfigPatch = parse_body(&body).map_err(|e| state.reject(ENDPOINT, e))?;
    let config = state
        .store
        .update(patch)
        .map_err(|e| state.reject(ENDPOINT, e))?;
    Ok(Json(json!({ "status": "ok", "config": mask_secrets(&config) })))
}

/// Component health: 200 while operational, 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Downstream readiness: 200 if every analysis service answers
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.probe.check(&state.store.get()).await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scan-logs", post(scan_logs))
        .route("/scan-logs-async", post(scan_logs_async))
        .route("/scan-logs-job/:job_id", get(scan_logs_job))
        .route("/incident", post(report_incident))
        .route("/github-webhook", post(github_webhook))
        .route("/clusters", get(clusters))
        .route("/namespaces/:cluster", get(namespaces))
        .route("/config", get(get_config).post(update_config))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
