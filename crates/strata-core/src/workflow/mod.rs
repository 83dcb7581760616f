//! Workflow engine: graph compilation, templating, checkpointing, step
//! execution and orchestration.

pub mod checkpoint;
pub mod graph;
pub mod orchestrator;
pub mod step_runner;
pub mod template;

#[cfg(test)]
pub(crate) mod test_support;

pub use graph::{build_dependency_graph, validate, DependencyGraph, ValidationError, Violation};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use step_runner::{StepError, StepExecutionError, StepExecutor, StepMeta};
pub use template::{merge_context, render_instruction, RenderError};
