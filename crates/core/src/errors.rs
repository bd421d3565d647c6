use thiserror::Error;

use crate::domain::approval::TripApprovalId;
use crate::domain::approver::DelegationId;
use crate::domain::catalog::SecurityLevel;
use crate::domain::traveler::{PersonId, TravelerId};
use crate::domain::trip::TripId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("security level must be 1, 2 or 3 (got {0})")]
    InvalidSecurityLevel(u8),
    #[error("unknown {field} `{value}`")]
    UnknownChoice { field: &'static str, value: String },
    #[error("invalid trip: {0}")]
    InvalidTrip(String),
    #[error("invalid delegation: {0}")]
    InvalidDelegation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures reported by a workflow store implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("uniqueness constraint violated: {0}")]
    UniqueViolation(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Every way a workflow call can be refused. None of them leave partial writes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no approver is configured for {level} on trip {trip_id:?}")]
    NoApproverConfigured { trip_id: TripId, level: SecurityLevel },
    #[error("{person:?} cannot approve their own trip {trip_id:?}")]
    SelfApproval { trip_id: TripId, person: PersonId },
    #[error("approval for {level} on trip {trip_id:?} is already pending")]
    AlreadyRequested { trip_id: TripId, level: SecurityLevel },
    #[error("{person:?} does not own trip {trip_id:?}")]
    NotOwner { trip_id: TripId, person: PersonId },
    #[error("{person:?} is not the approver for {level} on trip {trip_id:?}")]
    NotApprover { trip_id: TripId, level: SecurityLevel, person: PersonId },
    #[error("trip {trip_id:?} is missing details required for approval: {missing:?}")]
    IncompleteTripDetails { trip_id: TripId, missing: Vec<String> },
    #[error("trip {0:?} was not found")]
    TripNotFound(TripId),
    #[error("traveler {0:?} was not found")]
    TravelerNotFound(TravelerId),
    #[error("approval {0:?} was not found")]
    ApprovalNotFound(TripApprovalId),
    #[error("approval {0:?} has already been decided")]
    ApprovalAlreadyDecided(TripApprovalId),
    #[error("approval {0:?} was invalidated by a trip change")]
    ApprovalInvalidated(TripApprovalId),
    #[error("trip {trip_id:?} only requires approval up to {required}, not {level}")]
    TierNotRequired { trip_id: TripId, level: SecurityLevel, required: SecurityLevel },
    #[error("{level} on trip {trip_id:?} cannot be requested before {previous} is approved")]
    TierOutOfOrder { trip_id: TripId, level: SecurityLevel, previous: SecurityLevel },
    #[error("{0:?} holds no approver authority")]
    NotAnApprover(PersonId),
    #[error("delegation {0:?} was not found")]
    DelegationNotFound(DelegationId),
    #[error("{person:?} did not create delegation {delegation_id:?}")]
    NotDelegator { delegation_id: DelegationId, person: PersonId },
    #[error("an active delegation {0:?} already covers this approver")]
    DelegationAlreadyActive(DelegationId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Stable machine-readable class used by the CLI and request handlers.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NoApproverConfigured { .. } => "no_approver_configured",
            Self::SelfApproval { .. } => "self_approval",
            Self::AlreadyRequested { .. } => "already_requested",
            Self::NotOwner { .. } => "not_owner",
            Self::NotApprover { .. } => "not_approver",
            Self::IncompleteTripDetails { .. } => "incomplete_trip_details",
            Self::TripNotFound(_)
            | Self::TravelerNotFound(_)
            | Self::ApprovalNotFound(_)
            | Self::DelegationNotFound(_) => "not_found",
            Self::ApprovalAlreadyDecided(_) => "already_decided",
            Self::ApprovalInvalidated(_) => "approval_invalidated",
            Self::TierNotRequired { .. } => "tier_not_required",
            Self::TierOutOfOrder { .. } => "tier_out_of_order",
            Self::NotAnApprover(_) => "not_an_approver",
            Self::NotDelegator { .. } => "not_delegator",
            Self::DelegationAlreadyActive(_) => "delegation_already_active",
            Self::Domain(_) => "domain_validation",
            Self::Store(_) => "persistence",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Workflow(WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Domain(error) => Self::Domain(error),
            WorkflowError::Store(error) => Self::Persistence(error.to_string()),
            other => Self::Workflow(other),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The trip's approval state changed. Refresh it and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action on this trip.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => {
                Self::BadRequest { message: "domain validation failed".to_owned(), correlation_id }
            }
            ApplicationError::Workflow(error) => {
                let message = error.to_string();
                match error {
                    WorkflowError::AlreadyRequested { .. }
                    | WorkflowError::ApprovalAlreadyDecided(_)
                    | WorkflowError::DelegationAlreadyActive(_) => {
                        Self::Conflict { message, correlation_id }
                    }
                    WorkflowError::SelfApproval { .. }
                    | WorkflowError::NotOwner { .. }
                    | WorkflowError::NotApprover { .. }
                    | WorkflowError::NotAnApprover(_)
                    | WorkflowError::NotDelegator { .. } => {
                        Self::Forbidden { message, correlation_id }
                    }
                    _ => Self::BadRequest { message, correlation_id },
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::TripApprovalId;
    use crate::domain::approver::DelegationId;
    use crate::domain::catalog::SecurityLevel;
    use crate::domain::traveler::PersonId;
    use crate::domain::trip::TripId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError, StoreError, WorkflowError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvalidTrip(
            "trip ends before it starts".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn already_requested_maps_to_conflict() {
        let interface = ApplicationError::from(WorkflowError::AlreadyRequested {
            trip_id: TripId("TRP-1".to_owned()),
            level: SecurityLevel::Level1,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "The trip's approval state changed. Refresh it and try again."
        );
    }

    #[test]
    fn every_conflict_shares_a_neutral_user_message() {
        let decided = ApplicationError::from(WorkflowError::ApprovalAlreadyDecided(
            TripApprovalId("APR-1".to_owned()),
        ))
        .into_interface("req-6");
        let delegated = ApplicationError::from(WorkflowError::DelegationAlreadyActive(
            DelegationId("DLG-1".to_owned()),
        ))
        .into_interface("req-7");

        for interface in [decided, delegated] {
            assert!(matches!(interface, InterfaceError::Conflict { .. }));
            assert!(!interface.user_message().contains("pending"));
        }
    }

    #[test]
    fn authorization_failures_map_to_forbidden() {
        let interface = ApplicationError::from(WorkflowError::SelfApproval {
            trip_id: TripId("TRP-1".to_owned()),
            person: PersonId("u-1".to_owned()),
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
    }

    #[test]
    fn store_failure_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(WorkflowError::Store(StoreError::Backend("locked".to_owned())))
                .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("bad sender address".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn workflow_error_classes_are_stable() {
        let error = WorkflowError::IncompleteTripDetails {
            trip_id: TripId("TRP-1".to_owned()),
            missing: vec!["poet".to_owned()],
        };
        assert_eq!(error.class(), "incomplete_trip_details");
    }
}
