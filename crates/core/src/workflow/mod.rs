pub mod engine;
pub mod states;
pub mod store;

pub use engine::{ApprovalWorkflow, Decision, WorkflowOutcome};
pub use states::{ApprovalStage, ApprovalStatus};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
