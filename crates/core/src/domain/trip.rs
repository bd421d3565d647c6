use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{SecurityLevel, TravelCategory, TravelMode, TravelType};
use crate::domain::traveler::TravelerId;
use crate::errors::DomainError;

const MAX_REASON_CHARS: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub traveler: TravelerId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: TravelCategory,
    pub travel_type: TravelType,
    pub mode: TravelMode,
    pub reason: String,
    pub is_mission_critical: bool,
    pub is_travel_completed: bool,
    /// Number of approval tiers this trip must clear.
    pub security_level: SecurityLevel,
    pub approval_complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrip {
    pub id: TripId,
    pub name: String,
    pub traveler: TravelerId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: TravelCategory,
    pub travel_type: TravelType,
    pub mode: TravelMode,
    pub reason: String,
    pub is_mission_critical: bool,
    pub security_level: SecurityLevel,
}

impl Trip {
    pub fn new(input: NewTrip) -> Result<Self, DomainError> {
        if input.name.trim().is_empty() {
            return Err(DomainError::InvalidTrip("trip name is required".to_string()));
        }
        if input.reason.trim().is_empty() {
            return Err(DomainError::InvalidTrip("reason for travel is required".to_string()));
        }
        if input.reason.chars().count() > MAX_REASON_CHARS {
            return Err(DomainError::InvalidTrip(format!(
                "reason for travel must be at most {MAX_REASON_CHARS} characters"
            )));
        }
        if input.end_date < input.start_date {
            return Err(DomainError::InvalidTrip(format!(
                "trip ends ({}) before it starts ({})",
                input.end_date, input.start_date
            )));
        }

        Ok(Self {
            id: input.id,
            name: input.name.trim().to_string(),
            traveler: input.traveler,
            start_date: input.start_date,
            end_date: input.end_date,
            category: input.category,
            travel_type: input.travel_type,
            mode: input.mode,
            reason: input.reason,
            is_mission_critical: input.is_mission_critical,
            is_travel_completed: false,
            security_level: input.security_level,
            approval_complete: false,
            created_at: Utc::now(),
        })
    }

    pub fn requires(&self, level: SecurityLevel) -> bool {
        level <= self.security_level
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItineraryLegId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripItinerary {
    pub id: ItineraryLegId,
    pub trip: TripId,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub departure_city: String,
    pub left_transit: bool,
    pub leg_status: bool,
    pub comment: Option<String>,
}

/// Budget code (project, organisation, expenditure type, task) charged for the trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripPoet {
    pub trip: TripId,
    pub project: String,
    pub organisation: String,
    pub expenditure_type: String,
    pub task: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripExpense {
    pub id: ExpenseId,
    pub trip: TripId,
    pub expense_type: String,
    pub currency: String,
    pub amount: Decimal,
}

impl TripExpense {
    pub fn validate(&self) -> Result<(), DomainError> {
        let currency_ok =
            self.currency.len() == 3 && self.currency.chars().all(|ch| ch.is_ascii_uppercase());
        if !currency_ok {
            return Err(DomainError::InvalidTrip(format!(
                "expense currency `{}` must be a three-letter ISO code",
                self.currency
            )));
        }
        if self.amount.is_sign_negative() {
            return Err(DomainError::InvalidTrip("expense amount cannot be negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDependant {
    pub trip: TripId,
    pub traveler: TravelerId,
}

/// Child records a trip must carry before approval can be requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetails {
    pub itinerary: Vec<TripItinerary>,
    pub poet: Option<TripPoet>,
    pub expenses: Vec<TripExpense>,
    pub dependants: Vec<TripDependant>,
}

impl TripDetails {
    pub fn missing_for_approval(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.itinerary.is_empty() {
            missing.push("itinerary".to_string());
        }
        if self.poet.is_none() {
            missing.push("poet".to_string());
        }
        missing
    }

    pub fn total_expenses_by_currency(&self) -> BTreeMap<String, Decimal> {
        let mut totals = BTreeMap::new();
        for expense in &self.expenses {
            *totals.entry(expense.currency.clone()).or_insert(Decimal::ZERO) += expense.amount;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::{
        ExpenseId, ItineraryLegId, NewTrip, Trip, TripDetails, TripExpense, TripId, TripItinerary,
        TripPoet,
    };
    use crate::domain::catalog::{SecurityLevel, TravelCategory, TravelMode, TravelType};
    use crate::domain::traveler::TravelerId;
    use crate::errors::DomainError;

    fn new_trip() -> NewTrip {
        NewTrip {
            id: TripId("TRP-1".to_string()),
            name: "Field visit Gulu".to_string(),
            traveler: TravelerId("trv-1".to_string()),
            start_date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 9).expect("date"),
            category: TravelCategory::Business,
            travel_type: TravelType::Domestic,
            mode: TravelMode::Land,
            reason: "Programme monitoring".to_string(),
            is_mission_critical: true,
            security_level: SecurityLevel::Level2,
        }
    }

    fn expense(currency: &str, amount: i64) -> TripExpense {
        TripExpense {
            id: ExpenseId(format!("EXP-{currency}-{amount}")),
            trip: TripId("TRP-1".to_string()),
            expense_type: "per diem".to_string(),
            currency: currency.to_string(),
            amount: Decimal::new(amount, 2),
        }
    }

    #[test]
    fn new_trip_starts_unapproved() {
        let trip = Trip::new(new_trip()).expect("valid trip");
        assert!(!trip.approval_complete);
        assert!(!trip.is_travel_completed);
        assert!(trip.requires(SecurityLevel::Level2));
        assert!(!trip.requires(SecurityLevel::Level3));
    }

    #[test]
    fn trip_cannot_end_before_it_starts() {
        let mut input = new_trip();
        input.end_date = NaiveDate::from_ymd_opt(2026, 4, 30).expect("date");
        assert!(matches!(Trip::new(input), Err(DomainError::InvalidTrip(_))));
    }

    #[test]
    fn overlong_reason_is_rejected() {
        let mut input = new_trip();
        input.reason = "x".repeat(1001);
        assert!(matches!(Trip::new(input), Err(DomainError::InvalidTrip(_))));
    }

    #[test]
    fn missing_details_lists_itinerary_and_poet() {
        let mut details = TripDetails::default();
        assert_eq!(details.missing_for_approval(), vec!["itinerary", "poet"]);

        details.poet = Some(TripPoet {
            trip: TripId("TRP-1".to_string()),
            project: "P100".to_string(),
            organisation: "ORG-KE".to_string(),
            expenditure_type: "Travel".to_string(),
            task: "1.1".to_string(),
        });
        assert_eq!(details.missing_for_approval(), vec!["itinerary"]);

        details.itinerary.push(TripItinerary {
            id: ItineraryLegId("LEG-1".to_string()),
            trip: TripId("TRP-1".to_string()),
            departure_date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("date"),
            departure_time: NaiveTime::from_hms_opt(7, 30, 0).expect("time"),
            departure_city: "Kampala".to_string(),
            left_transit: false,
            leg_status: true,
            comment: None,
        });
        assert!(details.missing_for_approval().is_empty());
    }

    #[test]
    fn expenses_total_per_currency() {
        let details = TripDetails {
            expenses: vec![expense("USD", 10_000), expense("KES", 550_000), expense("USD", 2_550)],
            ..TripDetails::default()
        };
        let totals = details.total_expenses_by_currency();
        assert_eq!(totals.get("USD"), Some(&Decimal::new(12_550, 2)));
        assert_eq!(totals.get("KES"), Some(&Decimal::new(550_000, 2)));
    }

    #[test]
    fn expense_currency_must_be_iso_code() {
        assert!(expense("USD", 100).validate().is_ok());
        assert!(expense("usd", 100).validate().is_err());
        assert!(expense("USD", -100).validate().is_err());
    }
}
