use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::approvals::OrgDirectory;
use crate::domain::approval::{TripApproval, TripApprovalId};
use crate::domain::approver::ApprovalDelegation;
use crate::domain::trip::{Trip, TripDetails, TripId};
use crate::errors::StoreError;

/// Persistence port used by the approval workflow.
///
/// Implementations must reject a second valid approval row for the same trip
/// and security level with [`StoreError::UniqueViolation`], and must apply
/// [`WorkflowStore::invalidate_approvals`] atomically.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Snapshot of people, travelers, approvers and their delegations.
    async fn directory(&self) -> Result<OrgDirectory, StoreError>;

    async fn trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError>;

    async fn trip_details(&self, id: &TripId) -> Result<TripDetails, StoreError>;

    /// Every approval row for the trip, invalidated ones included.
    async fn approvals_for_trip(&self, id: &TripId) -> Result<Vec<TripApproval>, StoreError>;

    async fn approval(&self, id: &TripApprovalId) -> Result<Option<TripApproval>, StoreError>;

    /// Valid, undecided rows across all trips.
    async fn pending_approvals(&self) -> Result<Vec<TripApproval>, StoreError>;

    async fn insert_approval(&self, approval: &TripApproval) -> Result<(), StoreError>;

    /// Persists a decision. Fails with [`StoreError::NotFound`] when the row is no
    /// longer valid and undecided.
    async fn record_decision(&self, approval: &TripApproval) -> Result<(), StoreError>;

    async fn set_approval_complete(&self, trip: &TripId, complete: bool) -> Result<(), StoreError>;

    /// Clears `approval_complete` and marks every valid row invalid. Returns the
    /// number of rows invalidated.
    async fn invalidate_approvals(&self, trip: &TripId) -> Result<u64, StoreError>;

    async fn insert_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError>;

    async fn update_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError>;
}

#[derive(Default)]
struct StoreState {
    directory: OrgDirectory,
    trips: HashMap<TripId, Trip>,
    details: HashMap<TripId, TripDetails>,
    approvals: Vec<TripApproval>,
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryWorkflowStore {
    pub fn with_directory(directory: OrgDirectory) -> Self {
        Self { state: Arc::new(Mutex::new(StoreState { directory, ..StoreState::default() })) }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert_trip(&self, trip: Trip, details: TripDetails) {
        let mut state = self.state();
        state.details.insert(trip.id.clone(), details);
        state.trips.insert(trip.id.clone(), trip);
    }

    pub fn update_directory(&self, apply: impl FnOnce(&mut OrgDirectory)) {
        apply(&mut self.state().directory);
    }

    /// Writes an approval row without the uniqueness check, for setting up states
    /// the workflow itself would refuse to create.
    #[cfg(test)]
    pub(crate) fn force_approval(&self, approval: TripApproval) {
        self.state().approvals.push(approval);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn directory(&self) -> Result<OrgDirectory, StoreError> {
        Ok(self.state().directory.clone())
    }

    async fn trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError> {
        Ok(self.state().trips.get(id).cloned())
    }

    async fn trip_details(&self, id: &TripId) -> Result<TripDetails, StoreError> {
        Ok(self.state().details.get(id).cloned().unwrap_or_default())
    }

    async fn approvals_for_trip(&self, id: &TripId) -> Result<Vec<TripApproval>, StoreError> {
        Ok(self.state().approvals.iter().filter(|approval| &approval.trip == id).cloned().collect())
    }

    async fn approval(&self, id: &TripApprovalId) -> Result<Option<TripApproval>, StoreError> {
        Ok(self.state().approvals.iter().find(|approval| &approval.id == id).cloned())
    }

    async fn pending_approvals(&self) -> Result<Vec<TripApproval>, StoreError> {
        let state = self.state();
        Ok(state.approvals.iter().filter(|approval| approval.is_pending()).cloned().collect())
    }

    async fn insert_approval(&self, approval: &TripApproval) -> Result<(), StoreError> {
        let mut state = self.state();
        let duplicate = state.approvals.iter().any(|existing| {
            existing.is_valid
                && existing.trip == approval.trip
                && existing.security_level == approval.security_level
        });
        if approval.is_valid && duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "trip_approval({}, {})",
                approval.trip.0,
                approval.security_level.as_u8()
            )));
        }
        state.approvals.push(approval.clone());
        Ok(())
    }

    async fn record_decision(&self, approval: &TripApproval) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state
            .approvals
            .iter_mut()
            .find(|existing| existing.id == approval.id && existing.is_pending())
            .ok_or_else(|| StoreError::NotFound(format!("pending approval {}", approval.id.0)))?;
        stored.trip_is_approved = approval.trip_is_approved;
        stored.approval_comment = approval.approval_comment.clone();
        stored.decided_at = approval.decided_at;
        Ok(())
    }

    async fn set_approval_complete(&self, trip: &TripId, complete: bool) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state
            .trips
            .get_mut(trip)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", trip.0)))?;
        stored.approval_complete = complete;
        Ok(())
    }

    async fn invalidate_approvals(&self, trip: &TripId) -> Result<u64, StoreError> {
        let mut state = self.state();
        let stored = state
            .trips
            .get_mut(trip)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", trip.0)))?;
        stored.approval_complete = false;

        let mut invalidated = 0;
        for approval in state.approvals.iter_mut().filter(|row| &row.trip == trip && row.is_valid) {
            approval.is_valid = false;
            invalidated += 1;
        }
        Ok(invalidated)
    }

    async fn insert_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.directory.delegation(&delegation.id).is_some() {
            return Err(StoreError::UniqueViolation(format!(
                "approval_delegation({})",
                delegation.id.0
            )));
        }
        state.directory.insert_delegation(delegation.clone());
        Ok(())
    }

    async fn update_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.directory.delegation(&delegation.id).is_none() {
            return Err(StoreError::NotFound(format!("delegation {}", delegation.id.0)));
        }
        state.directory.insert_delegation(delegation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryWorkflowStore, WorkflowStore};
    use crate::domain::approval::TripApproval;
    use crate::domain::approver::ApproverId;
    use crate::domain::catalog::SecurityLevel;
    use crate::domain::trip::TripId;
    use crate::errors::StoreError;

    fn request(level: SecurityLevel) -> TripApproval {
        TripApproval::request(TripId("TRIP-1".to_string()), level, ApproverId("apr-1".to_string()))
    }

    #[tokio::test]
    async fn second_valid_row_for_same_tier_is_a_unique_violation() {
        let store = InMemoryWorkflowStore::default();
        store.insert_approval(&request(SecurityLevel::Level1)).await.expect("first insert");

        let error = store.insert_approval(&request(SecurityLevel::Level1)).await.expect_err("dup");
        assert!(matches!(error, StoreError::UniqueViolation(_)));

        store.insert_approval(&request(SecurityLevel::Level2)).await.expect("other tier");
    }

    #[tokio::test]
    async fn decisions_only_apply_to_pending_rows() {
        let store = InMemoryWorkflowStore::default();
        let mut approval = request(SecurityLevel::Level1);
        store.insert_approval(&approval).await.expect("insert");

        approval.record_decision(true, Some("fine".to_string()));
        store.record_decision(&approval).await.expect("first decision");

        let error = store.record_decision(&approval).await.expect_err("already decided");
        assert!(matches!(error, StoreError::NotFound(_)));
        let stored = store.approval(&approval.id).await.expect("load").expect("row");
        assert!(stored.is_granted());
    }
}
