use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approver::ApproverId;
use crate::domain::catalog::SecurityLevel;
use crate::domain::trip::TripId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripApprovalId(pub String);

impl TripApprovalId {
    pub fn generate() -> Self {
        Self(format!("APR-{}", Uuid::new_v4()))
    }
}

/// One escalation step of a trip's approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripApproval {
    pub id: TripApprovalId,
    pub trip: TripId,
    pub security_level: SecurityLevel,
    /// Approver resolved when the request was raised. Authority is re-resolved at decision
    /// time, so this is informational.
    pub approver: ApproverId,
    pub is_valid: bool,
    pub trip_is_approved: bool,
    pub approval_comment: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TripApproval {
    pub fn request(trip: TripId, security_level: SecurityLevel, approver: ApproverId) -> Self {
        Self {
            id: TripApprovalId::generate(),
            trip,
            security_level,
            approver,
            is_valid: true,
            trip_is_approved: false,
            approval_comment: None,
            requested_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.is_valid && self.decided_at.is_none()
    }

    pub fn is_declined(&self) -> bool {
        self.decided_at.is_some() && !self.trip_is_approved
    }

    pub fn is_granted(&self) -> bool {
        self.decided_at.is_some() && self.trip_is_approved
    }

    pub fn record_decision(&mut self, approved: bool, comment: Option<String>) {
        self.trip_is_approved = approved;
        self.approval_comment = comment.filter(|text| !text.trim().is_empty());
        self.decided_at = Some(Utc::now());
    }
}
