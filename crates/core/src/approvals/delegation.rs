use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::approvals::directory::OrgDirectory;
use crate::domain::approver::{ApprovalDelegation, ApproverId, DelegationId};
use crate::domain::traveler::PersonId;
use crate::errors::{DomainError, WorkflowError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegationRequest {
    pub delegate: ApproverId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Validate and build a new delegation from the approver held by `principal`.
///
/// An earlier delegation that is still flagged active but whose window already ended does
/// not block a new one.
pub fn plan_delegation(
    directory: &OrgDirectory,
    principal: &PersonId,
    request: DelegationRequest,
    today: NaiveDate,
) -> Result<ApprovalDelegation, WorkflowError> {
    let delegator = directory
        .approver_for_person(principal)
        .ok_or_else(|| WorkflowError::NotAnApprover(principal.clone()))?;

    let delegate = directory.approver(&request.delegate).ok_or_else(|| {
        DomainError::InvalidDelegation(format!("unknown delegate approver {:?}", request.delegate))
    })?;
    if delegate.id == delegator.id || delegate.person == delegator.person {
        return Err(DomainError::InvalidDelegation(
            "an approver cannot delegate to themselves".to_string(),
        )
        .into());
    }
    if request.end_date < request.start_date {
        return Err(DomainError::InvalidDelegation(format!(
            "delegation ends ({}) before it starts ({})",
            request.end_date, request.start_date
        ))
        .into());
    }
    if request.end_date < today {
        return Err(DomainError::InvalidDelegation(
            "delegation window has already ended".to_string(),
        )
        .into());
    }
    if request.reason.trim().is_empty() {
        return Err(DomainError::InvalidDelegation("a reason is required".to_string()).into());
    }

    let open = directory
        .delegations_from(&delegator.id)
        .into_iter()
        .find(|existing| existing.active && !existing.has_ended_by(today));
    if let Some(existing) = open {
        return Err(WorkflowError::DelegationAlreadyActive(existing.id.clone()));
    }

    Ok(ApprovalDelegation {
        id: DelegationId(format!("DLG-{}", Uuid::new_v4())),
        delegator: delegator.id.clone(),
        delegate: delegate.id.clone(),
        start_date: request.start_date,
        end_date: request.end_date,
        active: true,
        reason: request.reason.trim().to_string(),
        revocation_reason: None,
        created_at: Utc::now(),
    })
}

/// Deactivate a delegation on behalf of its delegator.
///
/// The window is closed at `today`; an end date already in the past is kept.
pub fn revoke_delegation(
    directory: &OrgDirectory,
    principal: &PersonId,
    delegation: &DelegationId,
    reason: &str,
    today: NaiveDate,
) -> Result<ApprovalDelegation, WorkflowError> {
    let existing = directory
        .delegation(delegation)
        .ok_or_else(|| WorkflowError::DelegationNotFound(delegation.clone()))?;
    let owns = directory
        .approver(&existing.delegator)
        .map(|approver| &approver.person == principal)
        .unwrap_or(false);
    if !owns {
        return Err(WorkflowError::NotDelegator {
            delegation_id: delegation.clone(),
            person: principal.clone(),
        });
    }

    let mut revoked = existing.clone();
    revoked.active = false;
    revoked.revocation_reason = Some(reason.trim().to_string()).filter(|text| !text.is_empty());
    revoked.end_date = revoked.end_date.min(today.max(revoked.start_date));
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{plan_delegation, revoke_delegation, DelegationRequest};
    use crate::approvals::fixtures::{approver, delegate, org, today};
    use crate::domain::catalog::SecurityLevel;
    use crate::domain::traveler::PersonId;
    use crate::errors::{DomainError, WorkflowError};

    fn line_manager_person(org: &crate::approvals::fixtures::Org) -> PersonId {
        org.directory.approver(&org.line_manager).expect("approver").person.clone()
    }

    #[test]
    fn approver_can_delegate_to_another_approver() {
        let org = org();
        let principal = line_manager_person(&org);

        let delegation = plan_delegation(
            &org.directory,
            &principal,
            DelegationRequest {
                delegate: org.department_l1.clone(),
                start_date: today(),
                end_date: today() + Duration::days(10),
                reason: " annual leave ".to_string(),
            },
            today(),
        )
        .expect("delegation should be planned");

        assert_eq!(delegation.delegator, org.line_manager);
        assert_eq!(delegation.delegate, org.department_l1);
        assert!(delegation.active);
        assert_eq!(delegation.reason, "annual leave");
    }

    #[test]
    fn non_approver_cannot_delegate() {
        let org = org();
        let error = plan_delegation(
            &org.directory,
            &org.owner,
            DelegationRequest {
                delegate: org.department_l1.clone(),
                start_date: today(),
                end_date: today(),
                reason: "leave".to_string(),
            },
            today(),
        )
        .expect_err("travelers hold no authority");
        assert_eq!(error, WorkflowError::NotAnApprover(org.owner.clone()));
    }

    #[test]
    fn self_delegation_and_inverted_window_are_rejected() {
        let org = org();
        let principal = line_manager_person(&org);
        let to_self = DelegationRequest {
            delegate: org.line_manager.clone(),
            start_date: today(),
            end_date: today(),
            reason: "leave".to_string(),
        };
        assert!(matches!(
            plan_delegation(&org.directory, &principal, to_self, today()),
            Err(WorkflowError::Domain(DomainError::InvalidDelegation(_)))
        ));

        let inverted = DelegationRequest {
            delegate: org.department_l1.clone(),
            start_date: today(),
            end_date: today() - Duration::days(1),
            reason: "leave".to_string(),
        };
        assert!(matches!(
            plan_delegation(&org.directory, &principal, inverted, today()),
            Err(WorkflowError::Domain(DomainError::InvalidDelegation(_)))
        ));
    }

    #[test]
    fn open_delegation_blocks_a_second_one_but_stale_flag_does_not() {
        let mut org = org();
        let principal = line_manager_person(&org);
        let other = approver(&mut org.directory, "apr-other", SecurityLevel::Level1);
        let line_manager = org.line_manager.clone();
        delegate(
            &mut org.directory,
            "DLG-stale",
            &line_manager,
            &other,
            today() - Duration::days(20),
            today() - Duration::days(10),
        );

        let request = DelegationRequest {
            delegate: org.department_l1.clone(),
            start_date: today(),
            end_date: today() + Duration::days(3),
            reason: "travel".to_string(),
        };
        let planned = plan_delegation(&org.directory, &principal, request.clone(), today())
            .expect("expired delegation should not block");
        org.directory.insert_delegation(planned.clone());

        let error = plan_delegation(&org.directory, &principal, request, today())
            .expect_err("open delegation blocks");
        assert_eq!(error, WorkflowError::DelegationAlreadyActive(planned.id));
    }

    #[test]
    fn revocation_closes_window_and_records_reason() {
        let mut org = org();
        let principal = line_manager_person(&org);
        let line_manager = org.line_manager.clone();
        let department_l1 = org.department_l1.clone();
        let id = delegate(
            &mut org.directory,
            "DLG-1",
            &line_manager,
            &department_l1,
            today() - Duration::days(2),
            today() + Duration::days(5),
        );

        let revoked = revoke_delegation(&org.directory, &principal, &id, "back early", today())
            .expect("revoked");
        assert!(!revoked.active);
        assert_eq!(revoked.end_date, today());
        assert_eq!(revoked.revocation_reason.as_deref(), Some("back early"));
        assert!(!revoked.is_effective_on(today()));
    }

    #[test]
    fn only_the_delegator_can_revoke() {
        let mut org = org();
        let line_manager = org.line_manager.clone();
        let department_l1 = org.department_l1.clone();
        let id = delegate(
            &mut org.directory,
            "DLG-1",
            &line_manager,
            &department_l1,
            today(),
            today() + Duration::days(5),
        );

        let error = revoke_delegation(&org.directory, &org.owner, &id, "nope", today())
            .expect_err("traveler cannot revoke");
        assert!(matches!(error, WorkflowError::NotDelegator { .. }));
    }
}
