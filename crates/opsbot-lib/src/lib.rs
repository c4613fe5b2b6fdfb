//! Core of the opsbot remediation agent
//!
//! This crate provides:
//! - Host metric sampling and anomaly classification
//! - Error log correlation and diagnosis
//! - Container restart remediation
//! - Chat notification with a persisted incident history
//! - The cycle orchestrator, health registry and observability

pub mod analyzer;
pub mod backends;
pub mod health;
pub mod history;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod orchestrator;
pub mod remediator;
pub mod retry;
pub mod sampler;
pub mod summarizer;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use orchestrator::{CycleStage, Orchestrator, OrchestratorConfig};
pub use retry::RetryPolicy;
