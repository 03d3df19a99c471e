//! Orchestration layer: sync vs async dispatch of the recommendation cores,
//! the bounded worker pool, and the periodic health probe.

mod orchestrator;
mod runner;
mod tasks;

pub use orchestrator::{Orchestrator, OrchestratorHealth, WorkflowOutcome};
pub use runner::{HealthSnapshot, RevokeOutcome, TaskHandler, TaskRunner, TaskView};
pub use tasks::{QueueName, TaskKind, VectorizeReport, WorkflowHandler, vectorize_products};
