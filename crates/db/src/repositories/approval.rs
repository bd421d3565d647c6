use sqlx::sqlite::SqliteRow;

use tripgate_core::domain::approval::{TripApproval, TripApprovalId};
use tripgate_core::domain::approver::ApproverId;
use tripgate_core::domain::trip::TripId;

use super::{
    column, parse_level, parse_timestamp, timestamp_to_sql, ApprovalRepository, RepositoryError,
};
use crate::DbPool;

const APPROVAL_COLUMNS: &str = "id, trip_id, security_level, approver_id, is_valid,
     trip_is_approved, approval_comment, requested_at, decided_at";

#[derive(Clone)]
pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_approval(row: &SqliteRow) -> Result<TripApproval, RepositoryError> {
    let requested_at: String = column(row, "requested_at")?;
    let decided_at: Option<String> = column(row, "decided_at")?;

    Ok(TripApproval {
        id: TripApprovalId(column(row, "id")?),
        trip: TripId(column(row, "trip_id")?),
        security_level: parse_level(column(row, "security_level")?)?,
        approver: ApproverId(column(row, "approver_id")?),
        is_valid: column(row, "is_valid")?,
        trip_is_approved: column(row, "trip_is_approved")?,
        approval_comment: column(row, "approval_comment")?,
        requested_at: parse_timestamp(&requested_at)?,
        decided_at: decided_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(
        &self,
        id: &TripApprovalId,
    ) -> Result<Option<TripApproval>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM trip_approval WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_trip(&self, trip: &TripId) -> Result<Vec<TripApproval>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM trip_approval
             WHERE trip_id = ?
             ORDER BY requested_at, security_level"
        ))
        .bind(&trip.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_approval).collect()
    }

    async fn list_pending(&self) -> Result<Vec<TripApproval>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM trip_approval
             WHERE is_valid = 1 AND decided_at IS NULL
             ORDER BY requested_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_approval).collect()
    }

    async fn insert(&self, approval: &TripApproval) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trip_approval (id, trip_id, security_level, approver_id, is_valid,
                                        trip_is_approved, approval_comment, requested_at,
                                        decided_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.id.0)
        .bind(&approval.trip.0)
        .bind(i64::from(approval.security_level.as_u8()))
        .bind(&approval.approver.0)
        .bind(approval.is_valid)
        .bind(approval.trip_is_approved)
        .bind(&approval.approval_comment)
        .bind(timestamp_to_sql(&approval.requested_at))
        .bind(approval.decided_at.as_ref().map(timestamp_to_sql))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_decision(&self, approval: &TripApproval) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE trip_approval
             SET trip_is_approved = ?, approval_comment = ?, decided_at = ?
             WHERE id = ? AND is_valid = 1 AND decided_at IS NULL",
        )
        .bind(approval.trip_is_approved)
        .bind(&approval.approval_comment)
        .bind(approval.decided_at.as_ref().map(timestamp_to_sql))
        .bind(&approval.id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_for_trip(&self, trip: &TripId) -> Result<Option<u64>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query("UPDATE trip SET approval_complete = 0 WHERE id = ?")
            .bind(&trip.0)
            .execute(&mut *tx)
            .await?;
        if cleared.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let invalidated =
            sqlx::query("UPDATE trip_approval SET is_valid = 0 WHERE trip_id = ? AND is_valid = 1")
                .bind(&trip.0)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(Some(invalidated.rows_affected()))
    }
}
