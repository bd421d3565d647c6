use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::SecurityLevel;
use crate::domain::traveler::PersonId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApproverId(pub String);

/// Approval authority held by exactly one person.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: ApproverId,
    pub person: PersonId,
    pub security_level: SecurityLevel,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DelegationId(pub String);

/// Temporary handoff of one approver's authority to another.
///
/// Nothing deactivates a delegation once `end_date` passes: `active` stays true until it is
/// revoked. Resolution checks the window as well as the flag, so a stale flag is harmless
/// there, but listings that only filter on `active` will still show expired delegations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDelegation {
    pub id: DelegationId,
    pub delegator: ApproverId,
    pub delegate: ApproverId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
    pub reason: String,
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalDelegation {
    /// Window bounds are inclusive on both ends.
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.active && self.start_date <= date && date <= self.end_date
    }

    pub fn has_ended_by(&self, date: NaiveDate) -> bool {
        self.end_date < date
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{ApprovalDelegation, ApproverId, DelegationId};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    fn delegation(active: bool) -> ApprovalDelegation {
        ApprovalDelegation {
            id: DelegationId("DLG-1".to_string()),
            delegator: ApproverId("apr-a".to_string()),
            delegate: ApproverId("apr-b".to_string()),
            start_date: date(10),
            end_date: date(20),
            active,
            reason: "annual leave".to_string(),
            revocation_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let delegation = delegation(true);
        assert!(!delegation.is_effective_on(date(9)));
        assert!(delegation.is_effective_on(date(10)));
        assert!(delegation.is_effective_on(date(20)));
        assert!(!delegation.is_effective_on(date(21)));
    }

    #[test]
    fn inactive_delegation_is_never_effective() {
        assert!(!delegation(false).is_effective_on(date(15)));
    }

    #[test]
    fn stale_active_flag_outside_window_is_ignored() {
        let delegation = delegation(true);
        assert!(delegation.active);
        assert!(delegation.has_ended_by(date(25)));
        assert!(!delegation.is_effective_on(date(25)));
    }
}
