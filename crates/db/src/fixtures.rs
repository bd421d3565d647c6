use sqlx::Executor;

use tripgate_core::domain::catalog::SecurityLevel;
use tripgate_core::domain::trip::TripId;
use tripgate_core::workflow::{ApprovalStage, ApprovalStatus};

use crate::connection::DbPool;
use crate::repositories::{
    ApprovalRepository, RepositoryError, SqlApprovalRepository, SqlTripRepository, TripRepository,
};

/// Demo trips and the approval stage each one is seeded into.
const SEED_TRIPS: &[SeedTripContract] = &[
    SeedTripContract {
        trip_id: "TRIP-1001",
        traveler_id: "trv-amina",
        security_level: 1,
        approval_complete: false,
        total_rows: 0,
        valid_rows: 0,
        has_details: true,
        stage: ApprovalStage::NotRequested,
        stage_label: "trip-1001-not-requested",
        description: "Domestic workshop, nothing requested yet",
    },
    SeedTripContract {
        trip_id: "TRIP-1002",
        traveler_id: "trv-amina",
        security_level: 2,
        approval_complete: false,
        total_rows: 2,
        valid_rows: 1,
        has_details: true,
        stage: ApprovalStage::Awaiting(SecurityLevel::Level1),
        stage_label: "trip-1002-awaiting-level-1",
        description: "Re-requested after an edit invalidated the first approval",
    },
    SeedTripContract {
        trip_id: "TRIP-1003",
        traveler_id: "trv-amina",
        security_level: 3,
        approval_complete: false,
        total_rows: 3,
        valid_rows: 3,
        has_details: true,
        stage: ApprovalStage::Awaiting(SecurityLevel::Level3),
        stage_label: "trip-1003-awaiting-level-3",
        description: "International trip waiting on the country security approver",
    },
    SeedTripContract {
        trip_id: "TRIP-1004",
        traveler_id: "trv-amina",
        security_level: 1,
        approval_complete: true,
        total_rows: 1,
        valid_rows: 1,
        has_details: true,
        stage: ApprovalStage::Approved,
        stage_label: "trip-1004-approved",
        description: "Home leave with a dependant, fully approved",
    },
    SeedTripContract {
        trip_id: "TRIP-1005",
        traveler_id: "trv-joseph",
        security_level: 2,
        approval_complete: false,
        total_rows: 1,
        valid_rows: 1,
        has_details: true,
        stage: ApprovalStage::Awaiting(SecurityLevel::Level2),
        stage_label: "trip-1005-stalled-level-2",
        description: "Level 1 granted; department has no level 2 approver",
    },
    SeedTripContract {
        trip_id: "TRIP-1006",
        traveler_id: "trv-amina",
        security_level: 2,
        approval_complete: false,
        total_rows: 1,
        valid_rows: 1,
        has_details: true,
        stage: ApprovalStage::Declined(SecurityLevel::Level1),
        stage_label: "trip-1006-declined-level-1",
        description: "Declined by the line manager",
    },
    SeedTripContract {
        trip_id: "TRIP-1007",
        traveler_id: "trv-amina",
        security_level: 1,
        approval_complete: false,
        total_rows: 0,
        valid_rows: 0,
        has_details: false,
        stage: ApprovalStage::NotRequested,
        stage_label: "trip-1007-missing-details",
        description: "Draft without itinerary or budget code",
    },
];

const SEED_PERSON_IDS: &[&str] =
    &["u-amina", "u-otieno", "u-wanjiku", "u-baraka", "u-halima", "u-joseph", "u-zawadi"];

const SEED_APPROVER_IDS: &[&str] = &["apr-otieno", "apr-wanjiku", "apr-baraka", "apr-halima"];

const SEED_DEPARTMENT_IDS: &[&str] = &["dept-programs", "dept-finance"];

const SEED_COUNTRY_IDS: &[&str] = &["KE", "UG"];

const SEED_TRAVELER_IDS: &[&str] = &["trv-amina", "trv-joseph", "trv-zawadi"];

const SEED_DELEGATION_IDS: &[&str] = &["dlg-otieno-2024", "dlg-wanjiku-secondment"];

/// Deterministic demo organisation with one trip in every approval stage.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let trips_seeded = SEED_TRIPS
            .iter()
            .map(|trip| TripSeedInfo {
                trip_id: trip.trip_id,
                stage: trip.stage,
                description: trip.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { trips_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        let trips = SqlTripRepository::new(pool.clone());
        let approvals = SqlApprovalRepository::new(pool.clone());

        let quoted_people = sql_array_from_ids(SEED_PERSON_IDS);
        let people: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM person WHERE id IN {quoted_people}"))
                .fetch_one(pool)
                .await?;
        checks.push(("people", people == SEED_PERSON_IDS.len() as i64));

        let quoted_approvers = sql_array_from_ids(SEED_APPROVER_IDS);
        let approvers: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM approver WHERE id IN {quoted_approvers}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("approvers", approvers == SEED_APPROVER_IDS.len() as i64));

        let stale_delegation: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM approval_delegation
                           WHERE id = 'dlg-otieno-2024' AND active = 1
                             AND end_date < '2025-01-01')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("stale-delegation-still-flagged", stale_delegation == 1));

        for contract in SEED_TRIPS {
            let trip_id = TripId(contract.trip_id.to_string());
            let Some(trip) = trips.find_by_id(&trip_id).await? else {
                checks.push((contract.trip_id, false));
                continue;
            };
            checks.push((
                contract.trip_id,
                trip.traveler.0 == contract.traveler_id
                    && i64::from(trip.security_level.as_u8()) == contract.security_level
                    && trip.approval_complete == contract.approval_complete,
            ));

            let rows = approvals.list_for_trip(&trip_id).await?;
            let valid = rows.iter().filter(|row| row.is_valid).count();
            checks.push((
                contract.rows_label(),
                rows.len() == contract.total_rows && valid == contract.valid_rows,
            ));

            let details = trips.details(&trip_id).await?;
            checks.push((
                contract.details_label(),
                details.missing_for_approval().is_empty() == contract.has_details,
            ));

            let status = ApprovalStatus::derive(&trip, &rows);
            checks.push((contract.stage_label, status.stage == contract.stage));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows. Trip children and approvals go with their trips.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let trip_ids = SEED_TRIPS.iter().map(|trip| trip.trip_id).collect::<Vec<_>>();
        let quoted_trips = sql_array_from_ids(&trip_ids);
        let quoted_delegations = sql_array_from_ids(SEED_DELEGATION_IDS);
        let quoted_travelers = sql_array_from_ids(SEED_TRAVELER_IDS);
        let quoted_departments = sql_array_from_ids(SEED_DEPARTMENT_IDS);
        let quoted_countries = sql_array_from_ids(SEED_COUNTRY_IDS);
        let quoted_approvers = sql_array_from_ids(SEED_APPROVER_IDS);
        let quoted_people = sql_array_from_ids(SEED_PERSON_IDS);

        sqlx::query(&format!("DELETE FROM trip WHERE id IN {quoted_trips}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM approval_delegation WHERE id IN {quoted_delegations}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM traveler WHERE id IN {quoted_travelers} AND dependant_of_id IS NOT NULL"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM traveler WHERE id IN {quoted_travelers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM department WHERE id IN {quoted_departments}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM country WHERE id IN {quoted_countries}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM approver WHERE id IN {quoted_approvers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM person WHERE id IN {quoted_people}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTripContract {
    trip_id: &'static str,
    traveler_id: &'static str,
    security_level: i64,
    approval_complete: bool,
    total_rows: usize,
    valid_rows: usize,
    has_details: bool,
    stage: ApprovalStage,
    stage_label: &'static str,
    description: &'static str,
}

impl SeedTripContract {
    fn rows_label(&self) -> &'static str {
        match self.trip_id {
            "TRIP-1001" => "trip-1001-approval-rows",
            "TRIP-1002" => "trip-1002-approval-rows",
            "TRIP-1003" => "trip-1003-approval-rows",
            "TRIP-1004" => "trip-1004-approval-rows",
            "TRIP-1005" => "trip-1005-approval-rows",
            "TRIP-1006" => "trip-1006-approval-rows",
            _ => "trip-1007-approval-rows",
        }
    }

    fn details_label(&self) -> &'static str {
        if self.has_details {
            "trip-details-complete"
        } else {
            "trip-details-missing"
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub trips_seeded: Vec<TripSeedInfo>,
}

#[derive(Debug)]
pub struct TripSeedInfo {
    pub trip_id: &'static str,
    pub stage: ApprovalStage,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
