use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::approval::TripApproval;
use crate::domain::catalog::SecurityLevel;
use crate::domain::trip::Trip;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "level", rename_all = "snake_case")]
pub enum ApprovalStage {
    NotRequested,
    Awaiting(SecurityLevel),
    Approved,
    Declined(SecurityLevel),
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => f.write_str("not requested"),
            Self::Awaiting(level) => write!(f, "awaiting {level}"),
            Self::Approved => f.write_str("approved"),
            Self::Declined(level) => write!(f, "declined at {level}"),
        }
    }
}

/// Where a trip sits in its approval chain, derived from the trip and its valid
/// approval rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub stage: ApprovalStage,
    pub pending: Option<TripApproval>,
}

impl ApprovalStatus {
    pub fn derive(trip: &Trip, approvals: &[TripApproval]) -> Self {
        let valid: Vec<&TripApproval> = approvals
            .iter()
            .filter(|approval| approval.is_valid && approval.trip == trip.id)
            .collect();

        if let Some(declined) = valid.iter().find(|approval| approval.is_declined()) {
            return Self { stage: ApprovalStage::Declined(declined.security_level), pending: None };
        }
        if trip.approval_complete {
            return Self { stage: ApprovalStage::Approved, pending: None };
        }

        let current = valid.iter().copied().max_by(|left, right| {
            left.requested_at
                .cmp(&right.requested_at)
                .then(left.security_level.cmp(&right.security_level))
        });
        match current {
            None => Self { stage: ApprovalStage::NotRequested, pending: None },
            Some(approval) if approval.is_pending() => Self {
                stage: ApprovalStage::Awaiting(approval.security_level),
                pending: Some(approval.clone()),
            },
            Some(approval) => {
                let next = approval
                    .security_level
                    .next()
                    .filter(|level| trip.requires(*level))
                    .unwrap_or(approval.security_level);
                Self { stage: ApprovalStage::Awaiting(next), pending: None }
            }
        }
    }

    /// Awaiting a tier that no pending row covers, typically after an
    /// escalation found no usable approver.
    pub fn is_stalled(&self) -> bool {
        matches!(self.stage, ApprovalStage::Awaiting(_)) && self.pending.is_none()
    }

    /// Tier the owner may request next, if any. A stalled final tier that is
    /// already granted is offered again; requesting it only sets the completion
    /// flag.
    pub fn next_requestable(&self, trip: &Trip) -> Option<SecurityLevel> {
        match self.stage {
            ApprovalStage::NotRequested => Some(SecurityLevel::Level1),
            ApprovalStage::Awaiting(level) if self.pending.is_none() && trip.requires(level) => {
                Some(level)
            }
            _ => None,
        }
    }
}
