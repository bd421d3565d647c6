use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use tripgate_core::approvals::OrgDirectory;
use tripgate_core::domain::approval::{TripApproval, TripApprovalId};
use tripgate_core::domain::approver::{ApprovalDelegation, Approver};
use tripgate_core::domain::catalog::SecurityLevel;
use tripgate_core::domain::traveler::{Country, Department, Person, Traveler, TravelerId};
use tripgate_core::domain::trip::{
    Trip, TripDependant, TripDetails, TripExpense, TripId, TripItinerary, TripPoet,
};
use tripgate_core::errors::{DomainError, StoreError};

pub mod approval;
pub mod directory;
pub mod trip;
pub mod workflow;

pub use approval::SqlApprovalRepository;
pub use directory::SqlDirectoryRepository;
pub use trip::SqlTripRepository;
pub use workflow::SqlWorkflowStore;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    Invalid(#[from] DomainError),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() =>
            {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            RepositoryError::Database(sqlx::Error::RowNotFound) => {
                StoreError::NotFound("row not found".to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn save_person(&self, person: &Person) -> Result<(), RepositoryError>;
    async fn save_approver(&self, approver: &Approver) -> Result<(), RepositoryError>;
    async fn save_department(&self, department: &Department) -> Result<(), RepositoryError>;
    async fn save_country(&self, country: &Country) -> Result<(), RepositoryError>;
    async fn save_traveler(&self, traveler: &Traveler) -> Result<(), RepositoryError>;
    /// Plain insert; a duplicate id is a unique violation.
    async fn insert_delegation(
        &self,
        delegation: &ApprovalDelegation,
    ) -> Result<(), RepositoryError>;
    /// Returns `false` when no delegation with that id exists.
    async fn update_delegation(
        &self,
        delegation: &ApprovalDelegation,
    ) -> Result<bool, RepositoryError>;
    async fn load_directory(&self) -> Result<OrgDirectory, RepositoryError>;
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn find_by_id(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError>;
    async fn save(&self, trip: &Trip) -> Result<(), RepositoryError>;
    async fn list_for_traveler(&self, traveler: &TravelerId)
        -> Result<Vec<Trip>, RepositoryError>;
    async fn save_itinerary(&self, leg: &TripItinerary) -> Result<(), RepositoryError>;
    async fn save_poet(&self, poet: &TripPoet) -> Result<(), RepositoryError>;
    async fn save_expense(&self, expense: &TripExpense) -> Result<(), RepositoryError>;
    async fn save_dependant(&self, dependant: &TripDependant) -> Result<(), RepositoryError>;
    async fn details(&self, id: &TripId) -> Result<TripDetails, RepositoryError>;
    /// Returns `false` when the trip does not exist.
    async fn set_approval_complete(
        &self,
        id: &TripId,
        complete: bool,
    ) -> Result<bool, RepositoryError>;
    async fn delete(&self, id: &TripId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &TripApprovalId,
    ) -> Result<Option<TripApproval>, RepositoryError>;
    async fn list_for_trip(&self, trip: &TripId) -> Result<Vec<TripApproval>, RepositoryError>;
    async fn list_pending(&self) -> Result<Vec<TripApproval>, RepositoryError>;
    async fn insert(&self, approval: &TripApproval) -> Result<(), RepositoryError>;
    /// Applies the decision only while the row is valid and undecided.
    async fn record_decision(&self, approval: &TripApproval) -> Result<bool, RepositoryError>;
    /// Clears `approval_complete` and invalidates every valid row in one transaction.
    /// `None` when the trip does not exist.
    async fn invalidate_for_trip(&self, trip: &TripId) -> Result<Option<u64>, RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn timestamp_to_sql(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{value}`: {e}")))
}

pub(crate) fn date_to_sql(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("date `{value}`: {e}")))
}

pub(crate) fn time_to_sql(value: &NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

pub(crate) fn parse_time(value: &str) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("time `{value}`: {e}")))
}

pub(crate) fn parse_level(value: i64) -> Result<SecurityLevel, RepositoryError> {
    SecurityLevel::from_raw(value)
        .ok_or_else(|| RepositoryError::Decode(format!("security level {value} out of range")))
}

pub(crate) fn parse_choice<T>(value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|e: DomainError| RepositoryError::Decode(e.to_string()))
}
