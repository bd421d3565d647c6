//! Explicit authorization checks for trip operations.
//!
//! Request handlers build an [`AccessPolicy`] from named predicates and evaluate it
//! against an [`AccessRequest`]; the first predicate that fails is reported.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::approvals::{ApproverResolver, OrgDirectory};
use crate::domain::approval::TripApproval;
use crate::domain::catalog::SecurityLevel;
use crate::domain::traveler::{PersonId, Traveler};
use crate::domain::trip::{Trip, TripId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPermission {
    View,
    Change,
}

/// Object-level grants on trips.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectPermissions {
    grants: HashMap<(PersonId, TripId), BTreeSet<TripPermission>>,
}

impl ObjectPermissions {
    pub fn grant(&mut self, person: &PersonId, trip: &TripId, permission: TripPermission) {
        self.grants.entry((person.clone(), trip.clone())).or_default().insert(permission);
    }

    /// Grants for a trip: the owner may view and change it, approvers assigned to any
    /// valid approval row may view it.
    pub fn for_trip(
        directory: &OrgDirectory,
        trip: &Trip,
        owner: &Traveler,
        approvals: &[TripApproval],
    ) -> Self {
        let mut permissions = Self::default();
        permissions.grant(&owner.person, &trip.id, TripPermission::View);
        permissions.grant(&owner.person, &trip.id, TripPermission::Change);
        for approval in approvals.iter().filter(|approval| approval.is_valid) {
            if let Some(approver) = directory.approver(&approval.approver) {
                permissions.grant(&approver.person, &trip.id, TripPermission::View);
            }
        }
        permissions
    }

    pub fn has(&self, person: &PersonId, trip: &TripId, permission: TripPermission) -> bool {
        self.grants
            .get(&(person.clone(), trip.clone()))
            .is_some_and(|granted| granted.contains(&permission))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPredicate {
    IsOwner,
    IsResolvedApprover(SecurityLevel),
    HasObjectPermission(TripPermission),
}

impl fmt::Display for AccessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsOwner => f.write_str("is_owner"),
            Self::IsResolvedApprover(level) => write!(f, "is_resolved_approver({level})"),
            Self::HasObjectPermission(TripPermission::View) => {
                f.write_str("has_object_permission(view)")
            }
            Self::HasObjectPermission(TripPermission::Change) => {
                f.write_str("has_object_permission(change)")
            }
        }
    }
}

pub struct AccessRequest<'a> {
    pub principal: &'a PersonId,
    pub trip: &'a Trip,
    pub owner: &'a Traveler,
    pub directory: &'a OrgDirectory,
    pub permissions: &'a ObjectPermissions,
    pub on: NaiveDate,
}

impl AccessRequest<'_> {
    fn satisfies(&self, predicate: AccessPredicate) -> bool {
        match predicate {
            AccessPredicate::IsOwner => &self.owner.person == self.principal,
            AccessPredicate::IsResolvedApprover(level) => ApproverResolver::new(self.directory)
                .resolve_approver(&self.owner.id, level, self.on)
                .is_some_and(|approver| &approver.person == self.principal),
            AccessPredicate::HasObjectPermission(permission) => {
                self.permissions.has(self.principal, &self.trip.id, permission)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessDenied {
    pub predicate: AccessPredicate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    predicates: Vec<AccessPredicate>,
}

impl AccessPolicy {
    pub fn new(predicates: Vec<AccessPredicate>) -> Self {
        Self { predicates }
    }

    pub fn owner() -> Self {
        Self::new(vec![
            AccessPredicate::IsOwner,
            AccessPredicate::HasObjectPermission(TripPermission::Change),
        ])
    }

    pub fn approver(level: SecurityLevel) -> Self {
        Self::new(vec![AccessPredicate::IsResolvedApprover(level)])
    }

    pub fn viewer() -> Self {
        Self::new(vec![AccessPredicate::HasObjectPermission(TripPermission::View)])
    }

    pub fn predicates(&self) -> &[AccessPredicate] {
        &self.predicates
    }

    pub fn check(&self, request: &AccessRequest<'_>) -> Result<(), AccessDenied> {
        match self.predicates.iter().copied().find(|predicate| !request.satisfies(*predicate)) {
            Some(predicate) => Err(AccessDenied { predicate }),
            None => Ok(()),
        }
    }
}
