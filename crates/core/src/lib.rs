pub mod access;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use access::{AccessDenied, AccessPolicy, AccessPredicate, ObjectPermissions, TripPermission};
pub use approvals::{ApproverResolver, DelegationRequest, OrgDirectory, Resolution};
pub use domain::approval::{TripApproval, TripApprovalId};
pub use domain::approver::{ApprovalDelegation, Approver, ApproverId, DelegationId};
pub use domain::catalog::SecurityLevel;
pub use domain::traveler::{PersonId, Traveler, TravelerId};
pub use domain::trip::{Trip, TripDetails, TripId};
pub use errors::{ApplicationError, DomainError, InterfaceError, StoreError, WorkflowError};
pub use notify::{NotificationRequest, NotificationWarning, Notifier, TemplateId};
pub use workflow::{
    ApprovalStage, ApprovalStatus, ApprovalWorkflow, Decision, InMemoryWorkflowStore,
    WorkflowOutcome, WorkflowStore,
};
