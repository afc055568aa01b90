//! Error taxonomy shared by every orchestrator component

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed or oversized request, rejected before any side effect
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("rate limit exceeded, try again later")]
    RateLimited,

    /// A downstream analysis, tracker, code-host or chat call failed
    #[error("{service} call failed: {message}")]
    Upstream { service: String, message: String },

    /// Webhook signature mismatch
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// External CLI exited non-zero or timed out
    #[error("{0}")]
    Resource(String),

    /// A required secret or endpoint is not configured
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn missing_setting(name: &str) -> Self {
        Self::Config(format!("{name} is not set"))
    }
}
