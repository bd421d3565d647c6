use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::approver::{ApprovalDelegation, Approver, ApproverId, DelegationId};
use crate::domain::traveler::{
    Country, CountryId, Department, DepartmentId, Person, PersonId, Traveler, TravelerId,
};

/// Indexed snapshot of the people, approvers and org units resolution walks over.
///
/// Records reference each other by id only; lookups never go more than two hops.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDirectory {
    persons: HashMap<PersonId, Person>,
    travelers: HashMap<TravelerId, Traveler>,
    departments: HashMap<DepartmentId, Department>,
    countries: HashMap<CountryId, Country>,
    approvers: HashMap<ApproverId, Approver>,
    delegations: HashMap<DelegationId, ApprovalDelegation>,
}

impl OrgDirectory {
    pub fn insert_person(&mut self, person: Person) {
        self.persons.insert(person.id.clone(), person);
    }

    pub fn insert_traveler(&mut self, traveler: Traveler) {
        self.travelers.insert(traveler.id.clone(), traveler);
    }

    pub fn insert_department(&mut self, department: Department) {
        self.departments.insert(department.id.clone(), department);
    }

    pub fn insert_country(&mut self, country: Country) {
        self.countries.insert(country.id.clone(), country);
    }

    pub fn insert_approver(&mut self, approver: Approver) {
        self.approvers.insert(approver.id.clone(), approver);
    }

    pub fn insert_delegation(&mut self, delegation: ApprovalDelegation) {
        self.delegations.insert(delegation.id.clone(), delegation);
    }

    pub fn person(&self, id: &PersonId) -> Option<&Person> {
        self.persons.get(id)
    }

    pub fn traveler(&self, id: &TravelerId) -> Option<&Traveler> {
        self.travelers.get(id)
    }

    pub fn traveler_for_person(&self, person: &PersonId) -> Option<&Traveler> {
        self.travelers.values().find(|traveler| &traveler.person == person)
    }

    pub fn department(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.get(id)
    }

    pub fn country(&self, id: &CountryId) -> Option<&Country> {
        self.countries.get(id)
    }

    pub fn approver(&self, id: &ApproverId) -> Option<&Approver> {
        self.approvers.get(id)
    }

    pub fn approver_for_person(&self, person: &PersonId) -> Option<&Approver> {
        self.approvers.values().find(|approver| &approver.person == person)
    }

    pub fn delegation(&self, id: &DelegationId) -> Option<&ApprovalDelegation> {
        self.delegations.get(id)
    }

    pub fn delegations_from(&self, delegator: &ApproverId) -> Vec<&ApprovalDelegation> {
        let mut delegations: Vec<&ApprovalDelegation> = self
            .delegations
            .values()
            .filter(|delegation| &delegation.delegator == delegator)
            .collect();
        delegations.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        delegations
    }

    /// The delegation in force for `delegator` on `date`.
    ///
    /// Only one is expected; if bookkeeping let several overlap, the most recently created wins.
    pub fn effective_delegation(
        &self,
        delegator: &ApproverId,
        date: NaiveDate,
    ) -> Option<&ApprovalDelegation> {
        self.delegations_from(delegator)
            .into_iter()
            .filter(|delegation| delegation.is_effective_on(date))
            .last()
    }

    /// Email address for a person, when the directory knows one.
    pub fn email_for(&self, person: &PersonId) -> Option<&str> {
        self.persons
            .get(person)
            .map(|person| person.email.as_str())
            .filter(|email| !email.trim().is_empty())
    }

    pub fn display_name_for(&self, person: &PersonId) -> String {
        self.persons
            .get(person)
            .map(|person| person.display_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| person.0.clone())
    }
}
