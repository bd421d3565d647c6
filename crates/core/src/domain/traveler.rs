use serde::{Deserialize, Serialize};

use crate::domain::approver::ApproverId;
use crate::domain::catalog::{SecurityLevel, TravelerKind};

/// A user account. The authenticated principal of every workflow call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub display_name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub level1_approver: Option<ApproverId>,
    pub level2_approver: Option<ApproverId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub security_level: SecurityLevel,
    pub level3_approver: Option<ApproverId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TravelerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    pub id: TravelerId,
    pub person: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub kind: TravelerKind,
    pub department: Option<DepartmentId>,
    pub country: Option<CountryId>,
    /// Directly assigned level-1 approver; overrides the department default.
    pub approver: Option<ApproverId>,
    pub line_manager: Option<TravelerId>,
    pub dependant_of: Option<TravelerId>,
}

impl Traveler {
    /// Default profile created alongside a new user account.
    pub fn for_new_account(person: &Person) -> Self {
        let (first_name, last_name) = split_display_name(&person.display_name);
        Self {
            id: TravelerId(format!("trv-{}", person.id.0)),
            person: person.id.clone(),
            first_name,
            last_name,
            kind: TravelerKind::Employee,
            department: None,
            country: None,
            approver: None,
            line_manager: None,
            dependant_of: None,
        }
    }

    pub fn full_name(&self) -> String {
        match (self.first_name.trim(), self.last_name.trim()) {
            ("", "") => self.person.0.clone(),
            (first, "") => first.to_string(),
            ("", last) => last.to_string(),
            (first, last) => format!("{first} {last}"),
        }
    }
}

fn split_display_name(display_name: &str) -> (String, String) {
    let trimmed = display_name.trim();
    match trimmed.rsplit_once(' ') {
        Some((first, last)) => (first.trim().to_string(), last.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}
