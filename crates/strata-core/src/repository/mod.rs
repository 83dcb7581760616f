//! Repository trait definitions (ports) and the in-memory adapter.
//!
//! The infrastructure layer (strata-infra) implements `WorkflowRepository`
//! with SQLite. `memory` provides a process-local implementation used by
//! tests and embedders that do not need durability.

pub mod memory;
pub mod workflow;

pub use memory::InMemoryWorkflowRepository;
pub use workflow::WorkflowRepository;
