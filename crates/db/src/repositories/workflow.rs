use async_trait::async_trait;

use tripgate_core::approvals::OrgDirectory;
use tripgate_core::domain::approval::{TripApproval, TripApprovalId};
use tripgate_core::domain::approver::ApprovalDelegation;
use tripgate_core::domain::trip::{Trip, TripDetails, TripId};
use tripgate_core::errors::StoreError;
use tripgate_core::workflow::WorkflowStore;

use super::{
    ApprovalRepository, DirectoryRepository, SqlApprovalRepository, SqlDirectoryRepository,
    SqlTripRepository, TripRepository,
};
use crate::DbPool;

/// SQLite-backed [`WorkflowStore`]. The partial unique index on
/// `trip_approval(trip_id, security_level) WHERE is_valid = 1` enforces one valid
/// row per tier.
#[derive(Clone)]
pub struct SqlWorkflowStore {
    directory: SqlDirectoryRepository,
    trips: SqlTripRepository,
    approvals: SqlApprovalRepository,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            directory: SqlDirectoryRepository::new(pool.clone()),
            trips: SqlTripRepository::new(pool.clone()),
            approvals: SqlApprovalRepository::new(pool),
        }
    }

    pub fn directory_repository(&self) -> &SqlDirectoryRepository {
        &self.directory
    }

    pub fn trip_repository(&self) -> &SqlTripRepository {
        &self.trips
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn directory(&self) -> Result<OrgDirectory, StoreError> {
        Ok(self.directory.load_directory().await?)
    }

    async fn trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError> {
        Ok(self.trips.find_by_id(id).await?)
    }

    async fn trip_details(&self, id: &TripId) -> Result<TripDetails, StoreError> {
        Ok(self.trips.details(id).await?)
    }

    async fn approvals_for_trip(&self, id: &TripId) -> Result<Vec<TripApproval>, StoreError> {
        Ok(self.approvals.list_for_trip(id).await?)
    }

    async fn approval(&self, id: &TripApprovalId) -> Result<Option<TripApproval>, StoreError> {
        Ok(self.approvals.find_by_id(id).await?)
    }

    async fn pending_approvals(&self) -> Result<Vec<TripApproval>, StoreError> {
        Ok(self.approvals.list_pending().await?)
    }

    async fn insert_approval(&self, approval: &TripApproval) -> Result<(), StoreError> {
        Ok(self.approvals.insert(approval).await?)
    }

    async fn record_decision(&self, approval: &TripApproval) -> Result<(), StoreError> {
        if self.approvals.record_decision(approval).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("pending approval {}", approval.id.0)))
        }
    }

    async fn set_approval_complete(&self, trip: &TripId, complete: bool) -> Result<(), StoreError> {
        if self.trips.set_approval_complete(trip, complete).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("trip {}", trip.0)))
        }
    }

    async fn invalidate_approvals(&self, trip: &TripId) -> Result<u64, StoreError> {
        self.approvals
            .invalidate_for_trip(trip)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", trip.0)))
    }

    async fn insert_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        Ok(self.directory.insert_delegation(delegation).await?)
    }

    async fn update_delegation(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        if self.directory.update_delegation(delegation).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("delegation {}", delegation.id.0)))
        }
    }
}
