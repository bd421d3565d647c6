use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;

use tripgate_core::domain::traveler::TravelerId;
use tripgate_core::domain::trip::{
    ExpenseId, ItineraryLegId, Trip, TripDependant, TripDetails, TripExpense, TripId,
    TripItinerary, TripPoet,
};

use super::{
    column, date_to_sql, parse_choice, parse_date, parse_level, parse_time, parse_timestamp,
    time_to_sql, timestamp_to_sql, RepositoryError, TripRepository,
};
use crate::DbPool;

const TRIP_COLUMNS: &str = "id, name, traveler_id, start_date, end_date, category, travel_type,
     mode, reason, is_mission_critical, is_travel_completed, security_level,
     approval_complete, created_at";

#[derive(Clone)]
pub struct SqlTripRepository {
    pool: DbPool,
}

impl SqlTripRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_trip(row: &SqliteRow) -> Result<Trip, RepositoryError> {
    let start_date: String = column(row, "start_date")?;
    let end_date: String = column(row, "end_date")?;
    let category: String = column(row, "category")?;
    let travel_type: String = column(row, "travel_type")?;
    let mode: String = column(row, "mode")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Trip {
        id: TripId(column(row, "id")?),
        name: column(row, "name")?,
        traveler: TravelerId(column(row, "traveler_id")?),
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        category: parse_choice(&category)?,
        travel_type: parse_choice(&travel_type)?,
        mode: parse_choice(&mode)?,
        reason: column(row, "reason")?,
        is_mission_critical: column(row, "is_mission_critical")?,
        is_travel_completed: column(row, "is_travel_completed")?,
        security_level: parse_level(column(row, "security_level")?)?,
        approval_complete: column(row, "approval_complete")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_itinerary(row: &SqliteRow) -> Result<TripItinerary, RepositoryError> {
    let departure_date: String = column(row, "departure_date")?;
    let departure_time: String = column(row, "departure_time")?;
    Ok(TripItinerary {
        id: ItineraryLegId(column(row, "id")?),
        trip: TripId(column(row, "trip_id")?),
        departure_date: parse_date(&departure_date)?,
        departure_time: parse_time(&departure_time)?,
        departure_city: column(row, "departure_city")?,
        left_transit: column(row, "left_transit")?,
        leg_status: column(row, "leg_status")?,
        comment: column(row, "comment")?,
    })
}

fn row_to_poet(row: &SqliteRow) -> Result<TripPoet, RepositoryError> {
    Ok(TripPoet {
        trip: TripId(column(row, "trip_id")?),
        project: column(row, "project")?,
        organisation: column(row, "organisation")?,
        expenditure_type: column(row, "expenditure_type")?,
        task: column(row, "task")?,
    })
}

fn row_to_expense(row: &SqliteRow) -> Result<TripExpense, RepositoryError> {
    let amount: String = column(row, "amount")?;
    Ok(TripExpense {
        id: ExpenseId(column(row, "id")?),
        trip: TripId(column(row, "trip_id")?),
        expense_type: column(row, "expense_type")?,
        currency: column(row, "currency")?,
        amount: amount
            .parse::<Decimal>()
            .map_err(|e| RepositoryError::Decode(format!("amount `{amount}`: {e}")))?,
    })
}

#[async_trait]
impl TripRepository for SqlTripRepository {
    async fn find_by_id(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TRIP_COLUMNS} FROM trip WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_trip(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, trip: &Trip) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trip (id, name, traveler_id, start_date, end_date, category, travel_type,
                               mode, reason, is_mission_critical, is_travel_completed,
                               security_level, approval_complete, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 category = excluded.category,
                 travel_type = excluded.travel_type,
                 mode = excluded.mode,
                 reason = excluded.reason,
                 is_mission_critical = excluded.is_mission_critical,
                 is_travel_completed = excluded.is_travel_completed,
                 security_level = excluded.security_level,
                 approval_complete = excluded.approval_complete",
        )
        .bind(&trip.id.0)
        .bind(&trip.name)
        .bind(&trip.traveler.0)
        .bind(date_to_sql(&trip.start_date))
        .bind(date_to_sql(&trip.end_date))
        .bind(trip.category.label())
        .bind(trip.travel_type.label())
        .bind(trip.mode.label())
        .bind(&trip.reason)
        .bind(trip.is_mission_critical)
        .bind(trip.is_travel_completed)
        .bind(i64::from(trip.security_level.as_u8()))
        .bind(trip.approval_complete)
        .bind(timestamp_to_sql(&trip.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_traveler(
        &self,
        traveler: &TravelerId,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip WHERE traveler_id = ? ORDER BY start_date, id"
        ))
        .bind(&traveler.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_trip).collect()
    }

    async fn save_itinerary(&self, leg: &TripItinerary) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trip_itinerary (id, trip_id, departure_date, departure_time,
                                         departure_city, left_transit, leg_status, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 departure_date = excluded.departure_date,
                 departure_time = excluded.departure_time,
                 departure_city = excluded.departure_city,
                 left_transit = excluded.left_transit,
                 leg_status = excluded.leg_status,
                 comment = excluded.comment",
        )
        .bind(&leg.id.0)
        .bind(&leg.trip.0)
        .bind(date_to_sql(&leg.departure_date))
        .bind(time_to_sql(&leg.departure_time))
        .bind(&leg.departure_city)
        .bind(leg.left_transit)
        .bind(leg.leg_status)
        .bind(&leg.comment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_poet(&self, poet: &TripPoet) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trip_poet (trip_id, project, organisation, expenditure_type, task)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(trip_id) DO UPDATE SET
                 project = excluded.project,
                 organisation = excluded.organisation,
                 expenditure_type = excluded.expenditure_type,
                 task = excluded.task",
        )
        .bind(&poet.trip.0)
        .bind(&poet.project)
        .bind(&poet.organisation)
        .bind(&poet.expenditure_type)
        .bind(&poet.task)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_expense(&self, expense: &TripExpense) -> Result<(), RepositoryError> {
        expense.validate()?;
        sqlx::query(
            "INSERT INTO trip_expense (id, trip_id, expense_type, currency, amount)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 expense_type = excluded.expense_type,
                 currency = excluded.currency,
                 amount = excluded.amount",
        )
        .bind(&expense.id.0)
        .bind(&expense.trip.0)
        .bind(&expense.expense_type)
        .bind(&expense.currency)
        .bind(expense.amount.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_dependant(&self, dependant: &TripDependant) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO trip_dependant (trip_id, traveler_id) VALUES (?, ?)")
            .bind(&dependant.trip.0)
            .bind(&dependant.traveler.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn details(&self, id: &TripId) -> Result<TripDetails, RepositoryError> {
        let itinerary = sqlx::query(
            "SELECT id, trip_id, departure_date, departure_time, departure_city, left_transit,
                    leg_status, comment
             FROM trip_itinerary WHERE trip_id = ? ORDER BY departure_date, departure_time",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_itinerary)
        .collect::<Result<Vec<_>, _>>()?;

        let poet = sqlx::query(
            "SELECT trip_id, project, organisation, expenditure_type, task
             FROM trip_poet WHERE trip_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(row_to_poet)
        .transpose()?;

        let expenses = sqlx::query(
            "SELECT id, trip_id, expense_type, currency, amount
             FROM trip_expense WHERE trip_id = ? ORDER BY id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_expense)
        .collect::<Result<Vec<_>, _>>()?;

        let dependants = sqlx::query(
            "SELECT trip_id, traveler_id FROM trip_dependant WHERE trip_id = ? ORDER BY traveler_id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(TripDependant {
                trip: TripId(column(row, "trip_id")?),
                traveler: TravelerId(column(row, "traveler_id")?),
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(TripDetails { itinerary, poet, expenses, dependants })
    }

    async fn set_approval_complete(
        &self,
        id: &TripId,
        complete: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE trip SET approval_complete = ? WHERE id = ?")
            .bind(complete)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &TripId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM trip WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
