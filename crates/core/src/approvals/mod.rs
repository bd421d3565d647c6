pub mod delegation;
pub mod directory;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::approver::{Approver, ApproverId, DelegationId};
use crate::domain::catalog::SecurityLevel;
use crate::domain::traveler::TravelerId;

pub use delegation::{plan_delegation, revoke_delegation, DelegationRequest};
pub use directory::OrgDirectory;

/// Where the originally accountable approver came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    TravelerAssignment,
    Department,
    Country,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The approver the org structure points at before delegation.
    pub assigned: ApproverId,
    /// The approver who holds authority today.
    pub approver: Approver,
    pub source: ResolutionSource,
    pub delegation: Option<DelegationId>,
}

impl Resolution {
    pub fn is_delegated(&self) -> bool {
        self.delegation.is_some()
    }
}

/// Answers "who approves this traveler at this tier on this date".
#[derive(Clone, Copy, Debug)]
pub struct ApproverResolver<'a> {
    directory: &'a OrgDirectory,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(directory: &'a OrgDirectory) -> Self {
        Self { directory }
    }

    pub fn resolve_approver(
        &self,
        traveler: &TravelerId,
        level: SecurityLevel,
        on: NaiveDate,
    ) -> Option<Approver> {
        self.resolve(traveler, level, on).map(|resolution| resolution.approver)
    }

    /// Same as [`Self::resolve_approver`] for a raw tier number; anything outside 1..=3 has
    /// no approver.
    pub fn resolve_approver_raw(
        &self,
        traveler: &TravelerId,
        level: i64,
        on: NaiveDate,
    ) -> Option<Approver> {
        SecurityLevel::from_raw(level).and_then(|level| self.resolve_approver(traveler, level, on))
    }

    pub fn resolve(
        &self,
        traveler: &TravelerId,
        level: SecurityLevel,
        on: NaiveDate,
    ) -> Option<Resolution> {
        let (assigned, source) = self.assigned_approver(traveler, level)?;
        let assigned_id = assigned.id.clone();

        // One hop only: the delegate's own delegations are not followed.
        let Some(delegation) = self.directory.effective_delegation(&assigned_id, on) else {
            return Some(Resolution {
                assigned: assigned_id,
                approver: assigned.clone(),
                source,
                delegation: None,
            });
        };

        let delegate = self.directory.approver(&delegation.delegate)?;
        Some(Resolution {
            assigned: assigned_id,
            approver: delegate.clone(),
            source,
            delegation: Some(delegation.id.clone()),
        })
    }

    fn assigned_approver(
        &self,
        traveler: &TravelerId,
        level: SecurityLevel,
    ) -> Option<(&'a Approver, ResolutionSource)> {
        let directory = self.directory;
        let traveler = directory.traveler(traveler)?;

        match level {
            SecurityLevel::Level1 => {
                let direct = traveler.approver.as_ref().and_then(|id| directory.approver(id));
                if let Some(approver) = direct {
                    return Some((approver, ResolutionSource::TravelerAssignment));
                }
                let department = directory.department(traveler.department.as_ref()?)?;
                let approver = directory.approver(department.level1_approver.as_ref()?)?;
                Some((approver, ResolutionSource::Department))
            }
            SecurityLevel::Level2 => {
                let department = directory.department(traveler.department.as_ref()?)?;
                let approver = directory.approver(department.level2_approver.as_ref()?)?;
                Some((approver, ResolutionSource::Department))
            }
            SecurityLevel::Level3 => {
                let country = directory.country(traveler.country.as_ref()?)?;
                let approver = directory.approver(country.level3_approver.as_ref()?)?;
                Some((approver, ResolutionSource::Country))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::fixtures::{approver, delegate, org, today};
    use super::{ApproverResolver, ResolutionSource};
    use crate::domain::catalog::SecurityLevel;
    use crate::domain::traveler::{DepartmentId, TravelerId};

    #[test]
    fn level_one_prefers_directly_assigned_approver() {
        let org = org();
        let resolver = ApproverResolver::new(&org.directory);

        let resolution =
            resolver.resolve(&org.traveler, SecurityLevel::Level1, today()).expect("resolved");
        assert_eq!(resolution.approver.id, org.line_manager);
        assert_eq!(resolution.source, ResolutionSource::TravelerAssignment);
        assert!(!resolution.is_delegated());
    }

    #[test]
    fn level_one_falls_back_to_department_then_none() {
        let mut org = org();
        let mut traveler = org.directory.traveler(&org.traveler).cloned().expect("traveler");
        traveler.approver = None;
        org.directory.insert_traveler(traveler.clone());

        let resolved = ApproverResolver::new(&org.directory)
            .resolve_approver(&org.traveler, SecurityLevel::Level1, today())
            .expect("department approver");
        assert_eq!(resolved.id, org.department_l1);

        traveler.department = None;
        org.directory.insert_traveler(traveler);
        assert_eq!(
            ApproverResolver::new(&org.directory).resolve_approver(
                &org.traveler,
                SecurityLevel::Level1,
                today()
            ),
            None
        );
    }

    #[test]
    fn level_two_uses_department_without_fallback() {
        let mut org = org();
        let resolved = ApproverResolver::new(&org.directory)
            .resolve_approver(&org.traveler, SecurityLevel::Level2, today())
            .expect("level 2");
        assert_eq!(resolved.id, org.department_l2);

        let programs = DepartmentId("dept-programs".to_string());
        let mut department = org.directory.department(&programs).cloned().expect("dept");
        department.level2_approver = None;
        org.directory.insert_department(department);

        assert_eq!(
            ApproverResolver::new(&org.directory).resolve_approver(
                &org.traveler,
                SecurityLevel::Level2,
                today()
            ),
            None,
            "the traveler's direct approver must not stand in for level 2"
        );
    }

    #[test]
    fn level_three_uses_country_of_duty() {
        let mut org = org();
        let resolution = ApproverResolver::new(&org.directory)
            .resolve(&org.traveler, SecurityLevel::Level3, today())
            .expect("level 3");
        assert_eq!(resolution.approver.id, org.country_l3);
        assert_eq!(resolution.source, ResolutionSource::Country);

        let mut traveler = org.directory.traveler(&org.traveler).cloned().expect("traveler");
        traveler.country = None;
        org.directory.insert_traveler(traveler);
        assert!(ApproverResolver::new(&org.directory)
            .resolve(&org.traveler, SecurityLevel::Level3, today())
            .is_none());
    }

    #[test]
    fn unknown_traveler_or_out_of_range_level_resolves_to_none() {
        let org = org();
        let resolver = ApproverResolver::new(&org.directory);
        let missing = TravelerId("trv-missing".to_string());
        assert!(resolver.resolve_approver(&missing, SecurityLevel::Level1, today()).is_none());
        assert!(resolver.resolve_approver_raw(&org.traveler, 0, today()).is_none());
        assert!(resolver.resolve_approver_raw(&org.traveler, 4, today()).is_none());
        assert!(resolver.resolve_approver_raw(&org.traveler, 1, today()).is_some());
    }

    #[test]
    fn delegation_resolves_a_single_hop() {
        let mut org = org();
        let delegate_b = approver(&mut org.directory, "apr-b", SecurityLevel::Level1);
        let delegate_c = approver(&mut org.directory, "apr-c", SecurityLevel::Level1);
        let window_start = today() - Duration::days(1);
        let window_end = today() + Duration::days(1);
        let line_manager = org.line_manager.clone();
        let (start, end) = (window_start, window_end);
        delegate(&mut org.directory, "DLG-A-B", &line_manager, &delegate_b, start, end);
        delegate(&mut org.directory, "DLG-B-C", &delegate_b, &delegate_c, start, end);

        let resolution = ApproverResolver::new(&org.directory)
            .resolve(&org.traveler, SecurityLevel::Level1, today())
            .expect("resolved");

        assert_eq!(resolution.approver.id, delegate_b);
        assert_ne!(resolution.approver.id, delegate_c);
        assert_eq!(resolution.assigned, org.line_manager);
        assert!(resolution.is_delegated());
    }

    #[test]
    fn delegation_window_end_is_inclusive() {
        let mut org = org();
        let delegate_b = approver(&mut org.directory, "apr-b", SecurityLevel::Level1);
        let line_manager = org.line_manager.clone();
        let start = today() - Duration::days(7);

        delegate(
            &mut org.directory,
            "DLG-ended",
            &line_manager,
            &delegate_b,
            start,
            today() - Duration::days(1),
        );
        let resolved = ApproverResolver::new(&org.directory)
            .resolve_approver(&org.traveler, SecurityLevel::Level1, today())
            .expect("resolved");
        assert_eq!(resolved.id, org.line_manager, "delegation ending yesterday is not applied");

        delegate(&mut org.directory, "DLG-today", &line_manager, &delegate_b, start, today());
        let resolved = ApproverResolver::new(&org.directory)
            .resolve_approver(&org.traveler, SecurityLevel::Level1, today())
            .expect("resolved");
        assert_eq!(resolved.id, delegate_b, "delegation ending today is applied");
    }
}
