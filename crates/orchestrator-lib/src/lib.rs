//! Incident response orchestration library
//!
//! This crate provides the core functionality for:
//! - Cluster log collection through kubectl
//! - A four-stage analysis pipeline over downstream ML services
//! - Escalation of critical incidents to an issue tracker
//! - Background scan jobs, rate limiting and runtime configuration
//! - Health checks and observability

pub mod collector;
pub mod config_store;
pub mod error;
pub mod health;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod ratelimit;
pub mod scan;
pub mod tickets;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestratorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OrchestratorMetrics, StructuredLogger};
pub use scan::{ScanConfig, ScanService};
