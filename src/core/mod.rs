pub mod analytics;
pub mod audit;
pub mod demo;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod records;
pub mod risk;

pub use analytics::{AgentMetrics, DashboardData};
pub use audit::{AuditFilter, AuditTrail};
pub use executor::WorkflowExecutor;
pub use orchestrator::OrchestrationService;
pub use crate::utils::error::Result;
