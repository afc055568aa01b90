//! Incident orchestrator HTTP service

pub mod api;
pub mod config;
