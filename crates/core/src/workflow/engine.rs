use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::access::{AccessPolicy, AccessRequest, ObjectPermissions};
use crate::approvals::{
    plan_delegation, revoke_delegation, ApproverResolver, DelegationRequest, OrgDirectory,
};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{TripApproval, TripApprovalId};
use crate::domain::approver::{ApprovalDelegation, Approver, DelegationId};
use crate::domain::catalog::SecurityLevel;
use crate::domain::traveler::{PersonId, Traveler, TravelerId};
use crate::domain::trip::{Trip, TripId};
use crate::errors::{StoreError, WorkflowError};
use crate::notify::{NotificationRequest, NotificationWarning, Notifier, Recipient, TemplateId};
use crate::workflow::states::ApprovalStatus;
use crate::workflow::store::WorkflowStore;

/// Result of a committed transition plus any notification problems it ran into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome<T> {
    pub value: T,
    pub warnings: Vec<NotificationWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub approval: TripApproval,
    /// Next-tier request opened by an approval.
    pub escalated: Option<TripApproval>,
    pub approval_complete: bool,
    /// Tier left without a pending request because no usable approver exists.
    pub stalled_at: Option<SecurityLevel>,
}

struct TripContext {
    directory: OrgDirectory,
    trip: Trip,
    owner: Traveler,
    today: NaiveDate,
}

/// Trip approval workflow over a store, a mailer and an audit sink.
pub struct ApprovalWorkflow<S, N, A> {
    store: S,
    notifier: N,
    audit: A,
}

impl<S, N, A> ApprovalWorkflow<S, N, A>
where
    S: WorkflowStore,
    N: Notifier,
    A: AuditSink,
{
    pub fn new(store: S, notifier: N, audit: A) -> Self {
        Self { store, notifier, audit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub async fn resolve_approver(
        &self,
        traveler: &TravelerId,
        level: SecurityLevel,
    ) -> Result<Option<Approver>, WorkflowError> {
        let directory = self.store.directory().await?;
        Ok(ApproverResolver::new(&directory).resolve_approver(traveler, level, today()))
    }

    pub async fn request_approval(
        &self,
        principal: &PersonId,
        trip_id: &TripId,
        level: SecurityLevel,
        audit: &AuditContext,
    ) -> Result<WorkflowOutcome<TripApproval>, WorkflowError> {
        let result = self.request_approval_inner(principal, trip_id, level).await;
        self.emit(audit, trip_id, "approval.requested", &result, |outcome| {
            vec![
                ("level", level.as_u8().to_string()),
                ("approval_id", outcome.value.id.0.clone()),
                ("approver", outcome.value.approver.0.clone()),
            ]
        });
        if let Err(error) = &result {
            info!(
                event_name = "workflow.approval.request_rejected",
                correlation_id = %audit.correlation_id,
                trip_id = %trip_id.0,
                level = level.as_u8(),
                error_class = error.class(),
                "approval request rejected"
            );
        }
        result
    }

    async fn request_approval_inner(
        &self,
        principal: &PersonId,
        trip_id: &TripId,
        level: SecurityLevel,
    ) -> Result<WorkflowOutcome<TripApproval>, WorkflowError> {
        let context = self.load_trip(trip_id).await?;
        let approvals = self.store.approvals_for_trip(trip_id).await?;

        let permissions = ObjectPermissions::for_trip(
            &context.directory,
            &context.trip,
            &context.owner,
            &approvals,
        );
        AccessPolicy::owner().check(&context.access(principal, &permissions)).map_err(|_| {
            WorkflowError::NotOwner { trip_id: trip_id.clone(), person: principal.clone() }
        })?;

        if !context.trip.requires(level) {
            return Err(WorkflowError::TierNotRequired {
                trip_id: trip_id.clone(),
                level,
                required: context.trip.security_level,
            });
        }
        if let Some(previous) = level.previous() {
            let cleared = approvals.iter().any(|approval| {
                approval.is_valid && approval.security_level == previous && approval.is_granted()
            });
            if !cleared {
                return Err(WorkflowError::TierOutOfOrder {
                    trip_id: trip_id.clone(),
                    level,
                    previous,
                });
            }
        }

        let final_tier = !level.next().is_some_and(|next| context.trip.requires(next));
        let granted = approvals.iter().find(|approval| {
            approval.is_valid && approval.security_level == level && approval.is_granted()
        });
        if let Some(granted) = granted.filter(|_| final_tier && !context.trip.approval_complete) {
            return Ok(self.complete_stalled_trip(&context, granted.clone()).await?);
        }

        let missing = self.store.trip_details(trip_id).await?.missing_for_approval();
        if !missing.is_empty() {
            return Err(WorkflowError::IncompleteTripDetails {
                trip_id: trip_id.clone(),
                missing,
            });
        }

        let approval = self.open_tier(&context, level).await?;
        let template = if level == SecurityLevel::Level1 {
            TemplateId::ApprovalRequested
        } else {
            TemplateId::ApprovalEscalated
        };
        let mut warnings = Vec::new();
        self.notify_tier_opened(&context, &approval, template, &mut warnings).await;
        Ok(WorkflowOutcome { value: approval, warnings })
    }

    /// Sets the completion flag a granted final tier never got to write.
    async fn complete_stalled_trip(
        &self,
        context: &TripContext,
        granted: TripApproval,
    ) -> Result<WorkflowOutcome<TripApproval>, StoreError> {
        let trip_id = &context.trip.id;
        self.store.set_approval_complete(trip_id, true).await?;
        info!(
            event_name = "workflow.trip.approval_recovered",
            trip_id = %trip_id.0,
            approval_id = %granted.id.0,
            level = granted.security_level.as_u8(),
            "final tier was already granted; trip marked approved"
        );

        let mut warnings = Vec::new();
        let request = trip_notification(context, TemplateId::TripApproved, granted.security_level)
            .with_context("approver_name", approver_name(context, &granted))
            .with_context("comment", granted.approval_comment.clone().unwrap_or_default())
            .with_context("approval_complete", true)
            .with_recipient(owner_recipient(context));
        self.dispatch(&request, &mut warnings).await;
        Ok(WorkflowOutcome { value: granted, warnings })
    }

    /// Resolves the tier's approver and writes the request row.
    async fn open_tier(
        &self,
        context: &TripContext,
        level: SecurityLevel,
    ) -> Result<TripApproval, WorkflowError> {
        let trip_id = &context.trip.id;
        let approver = ApproverResolver::new(&context.directory)
            .resolve_approver(&context.owner.id, level, context.today)
            .ok_or_else(|| WorkflowError::NoApproverConfigured {
                trip_id: trip_id.clone(),
                level,
            })?;
        if approver.person == context.owner.person {
            return Err(WorkflowError::SelfApproval {
                trip_id: trip_id.clone(),
                person: approver.person,
            });
        }

        let approval = TripApproval::request(trip_id.clone(), level, approver.id.clone());
        match self.store.insert_approval(&approval).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                return Err(WorkflowError::AlreadyRequested { trip_id: trip_id.clone(), level });
            }
            Err(error) => return Err(error.into()),
        }

        info!(
            event_name = "workflow.approval.requested",
            trip_id = %trip_id.0,
            approval_id = %approval.id.0,
            level = level.as_u8(),
            approver = %approver.id.0,
            "approval request opened"
        );
        Ok(approval)
    }

    pub async fn decide(
        &self,
        principal: &PersonId,
        approval_id: &TripApprovalId,
        approved: bool,
        comment: Option<String>,
        audit: &AuditContext,
    ) -> Result<WorkflowOutcome<Decision>, WorkflowError> {
        let result = self.decide_inner(principal, approval_id, approved, comment).await;
        let trip_id = match &result {
            Ok(outcome) => Some(outcome.value.approval.trip.clone()),
            Err(_) => self.store.approval(approval_id).await.ok().flatten().map(|row| row.trip),
        };
        let event_type = if approved { "approval.granted" } else { "approval.declined" };
        self.emit_for(audit, trip_id, event_type, &result, |outcome| {
            let mut metadata = vec![
                ("approval_id", outcome.value.approval.id.0.clone()),
                ("level", outcome.value.approval.security_level.as_u8().to_string()),
                ("approval_complete", outcome.value.approval_complete.to_string()),
            ];
            if let Some(escalated) = &outcome.value.escalated {
                metadata.push(("escalated_to", escalated.security_level.as_u8().to_string()));
            }
            if let Some(stalled) = outcome.value.stalled_at {
                metadata.push(("stalled_at", stalled.as_u8().to_string()));
            }
            metadata
        });
        result
    }

    async fn decide_inner(
        &self,
        principal: &PersonId,
        approval_id: &TripApprovalId,
        approved: bool,
        comment: Option<String>,
    ) -> Result<WorkflowOutcome<Decision>, WorkflowError> {
        let mut approval = self
            .store
            .approval(approval_id)
            .await?
            .ok_or_else(|| WorkflowError::ApprovalNotFound(approval_id.clone()))?;
        if !approval.is_valid {
            return Err(WorkflowError::ApprovalInvalidated(approval_id.clone()));
        }
        if approval.decided_at.is_some() {
            return Err(WorkflowError::ApprovalAlreadyDecided(approval_id.clone()));
        }

        let context = self.load_trip(&approval.trip).await?;
        let trip_id = context.trip.id.clone();
        let level = approval.security_level;

        // Authority is re-resolved now so delegation changes since the request count.
        let resolved = ApproverResolver::new(&context.directory)
            .resolve_approver(&context.owner.id, level, context.today);
        let owner_is_resolved =
            resolved.as_ref().is_some_and(|approver| approver.person == context.owner.person);
        if owner_is_resolved || principal == &context.owner.person {
            return Err(WorkflowError::SelfApproval {
                trip_id,
                person: context.owner.person.clone(),
            });
        }
        let permissions = ObjectPermissions::default();
        AccessPolicy::approver(level).check(&context.access(principal, &permissions)).map_err(
            |_| WorkflowError::NotApprover {
                trip_id: trip_id.clone(),
                level,
                person: principal.clone(),
            },
        )?;

        approval.record_decision(approved, comment);
        match self.store.record_decision(&approval).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(WorkflowError::ApprovalAlreadyDecided(approval_id.clone()));
            }
            Err(error) => return Err(error.into()),
        }
        info!(
            event_name = "workflow.approval.decided",
            trip_id = %trip_id.0,
            approval_id = %approval.id.0,
            level = level.as_u8(),
            approved,
            "approval decision recorded"
        );

        let mut warnings = Vec::new();
        let mut decision =
            Decision { approval, escalated: None, approval_complete: false, stalled_at: None };

        if !approved {
            let request = trip_notification(&context, TemplateId::TripDeclined, level)
                .with_context("approver_name", context.directory.display_name_for(principal))
                .with_context(
                    "comment",
                    decision.approval.approval_comment.clone().unwrap_or_default(),
                )
                .with_recipient(owner_recipient(&context));
            self.dispatch(&request, &mut warnings).await;
            return Ok(WorkflowOutcome { value: decision, warnings });
        }

        match level.next().filter(|next| context.trip.requires(*next)) {
            Some(next) => match self.open_tier(&context, next).await {
                Ok(escalated) => {
                    self.notify_tier_opened(
                        &context,
                        &escalated,
                        TemplateId::ApprovalEscalated,
                        &mut warnings,
                    )
                    .await;
                    decision.escalated = Some(escalated);
                }
                Err(error @ WorkflowError::NoApproverConfigured { .. })
                | Err(error @ WorkflowError::SelfApproval { .. }) => {
                    warn!(
                        event_name = "workflow.approval.escalation_stalled",
                        trip_id = %trip_id.0,
                        level = next.as_u8(),
                        error_class = error.class(),
                        "no usable approver for next tier"
                    );
                    let request = trip_notification(&context, TemplateId::ApprovalUnassigned, next)
                        .with_context("reason", unassigned_reason(&error, next))
                        .with_recipient(owner_recipient(&context));
                    self.dispatch(&request, &mut warnings).await;
                    decision.stalled_at = Some(next);
                }
                Err(WorkflowError::AlreadyRequested { .. }) => {
                    info!(
                        event_name = "workflow.approval.escalation_exists",
                        trip_id = %trip_id.0,
                        level = next.as_u8(),
                        "next tier already has a request"
                    );
                }
                Err(error) => return Err(error),
            },
            None => {
                self.store.set_approval_complete(&trip_id, true).await?;
                decision.approval_complete = true;
                info!(
                    event_name = "workflow.trip.approved",
                    trip_id = %trip_id.0,
                    level = level.as_u8(),
                    "all required approvals granted"
                );
                let request = trip_notification(&context, TemplateId::TripApproved, level)
                    .with_context("approver_name", context.directory.display_name_for(principal))
                    .with_context(
                        "comment",
                        decision.approval.approval_comment.clone().unwrap_or_default(),
                    )
                    .with_context("approval_complete", true)
                    .with_recipient(owner_recipient(&context));
                self.dispatch(&request, &mut warnings).await;
            }
        }

        Ok(WorkflowOutcome { value: decision, warnings })
    }

    /// Voids every valid approval row for the trip after its content changed.
    pub async fn invalidate_trip_approval(
        &self,
        trip_id: &TripId,
        audit: &AuditContext,
    ) -> Result<u64, WorkflowError> {
        let result = async {
            if self.store.trip(trip_id).await?.is_none() {
                return Err(WorkflowError::TripNotFound(trip_id.clone()));
            }
            Ok::<_, WorkflowError>(self.store.invalidate_approvals(trip_id).await?)
        }
        .await;
        self.emit(audit, trip_id, "approval.invalidated", &result, |invalidated| {
            vec![("invalidated_rows", invalidated.to_string())]
        });
        if let Ok(invalidated) = &result {
            info!(
                event_name = "workflow.approval.invalidated",
                correlation_id = %audit.correlation_id,
                trip_id = %trip_id.0,
                invalidated_rows = invalidated,
                "trip approvals invalidated"
            );
        }
        result
    }

    pub async fn get_approval_status(
        &self,
        trip_id: &TripId,
    ) -> Result<ApprovalStatus, WorkflowError> {
        let trip = self
            .store
            .trip(trip_id)
            .await?
            .ok_or_else(|| WorkflowError::TripNotFound(trip_id.clone()))?;
        let approvals = self.store.approvals_for_trip(trip_id).await?;
        Ok(ApprovalStatus::derive(&trip, &approvals))
    }

    /// Every approval row for the trip, oldest request first.
    pub async fn approval_history(
        &self,
        trip_id: &TripId,
    ) -> Result<Vec<TripApproval>, WorkflowError> {
        if self.store.trip(trip_id).await?.is_none() {
            return Err(WorkflowError::TripNotFound(trip_id.clone()));
        }
        let mut approvals = self.store.approvals_for_trip(trip_id).await?;
        approvals.sort_by(|left, right| {
            left.requested_at
                .cmp(&right.requested_at)
                .then(left.security_level.cmp(&right.security_level))
        });
        Ok(approvals)
    }

    /// Pending requests the principal may decide today, delegation included.
    pub async fn pending_approvals_for(
        &self,
        principal: &PersonId,
    ) -> Result<Vec<TripApproval>, WorkflowError> {
        let directory = self.store.directory().await?;
        let resolver = ApproverResolver::new(&directory);
        let on = today();

        let mut inbox = Vec::new();
        for approval in self.store.pending_approvals().await? {
            let Some(trip) = self.store.trip(&approval.trip).await? else {
                continue;
            };
            let Some(owner) = directory.traveler(&trip.traveler) else {
                continue;
            };
            if &owner.person == principal {
                continue;
            }
            let holds_authority = resolver
                .resolve_approver(&owner.id, approval.security_level, on)
                .is_some_and(|approver| &approver.person == principal);
            if holds_authority {
                inbox.push(approval);
            }
        }
        inbox.sort_by(|left, right| left.requested_at.cmp(&right.requested_at));
        Ok(inbox)
    }

    pub async fn create_delegation(
        &self,
        principal: &PersonId,
        request: DelegationRequest,
        audit: &AuditContext,
    ) -> Result<ApprovalDelegation, WorkflowError> {
        let result = async {
            let directory = self.store.directory().await?;
            let delegation = plan_delegation(&directory, principal, request, today())?;
            self.store.insert_delegation(&delegation).await?;
            Ok::<_, WorkflowError>(delegation)
        }
        .await;
        self.emit_delegation(audit, "delegation.created", &result);
        result
    }

    pub async fn revoke_delegation(
        &self,
        principal: &PersonId,
        delegation_id: &DelegationId,
        reason: &str,
        audit: &AuditContext,
    ) -> Result<ApprovalDelegation, WorkflowError> {
        let result = async {
            let directory = self.store.directory().await?;
            let delegation =
                revoke_delegation(&directory, principal, delegation_id, reason, today())?;
            self.store.update_delegation(&delegation).await?;
            Ok::<_, WorkflowError>(delegation)
        }
        .await;
        self.emit_delegation(audit, "delegation.revoked", &result);
        result
    }

    async fn load_trip(&self, trip_id: &TripId) -> Result<TripContext, WorkflowError> {
        let trip = self
            .store
            .trip(trip_id)
            .await?
            .ok_or_else(|| WorkflowError::TripNotFound(trip_id.clone()))?;
        let directory = self.store.directory().await?;
        let owner = directory
            .traveler(&trip.traveler)
            .cloned()
            .ok_or_else(|| WorkflowError::TravelerNotFound(trip.traveler.clone()))?;
        Ok(TripContext { directory, trip, owner, today: today() })
    }

    async fn notify_tier_opened(
        &self,
        context: &TripContext,
        approval: &TripApproval,
        template: TemplateId,
        warnings: &mut Vec<NotificationWarning>,
    ) {
        let mut request = trip_notification(context, template, approval.security_level);
        if let Some(approver) = context.directory.approver(&approval.approver) {
            request = request.with_recipient(recipient(&context.directory, &approver.person));
        }
        let request = request.with_recipient(owner_recipient(context));
        self.dispatch(&request, warnings).await;
    }

    async fn dispatch(
        &self,
        request: &NotificationRequest,
        warnings: &mut Vec<NotificationWarning>,
    ) {
        if let Err(error) = self.notifier.send(request).await {
            warn!(
                event_name = "workflow.notification.failed",
                template = %request.template,
                error = %error,
                "notification failed after transition was committed"
            );
            warnings.push(NotificationWarning {
                template: request.template,
                message: error.to_string(),
            });
        }
    }

    fn emit<T>(
        &self,
        audit: &AuditContext,
        trip_id: &TripId,
        event_type: &str,
        result: &Result<T, WorkflowError>,
        metadata: impl FnOnce(&T) -> Vec<(&'static str, String)>,
    ) {
        self.emit_for(audit, Some(trip_id.clone()), event_type, result, metadata);
    }

    fn emit_for<T>(
        &self,
        audit: &AuditContext,
        trip_id: Option<TripId>,
        event_type: &str,
        result: &Result<T, WorkflowError>,
        metadata: impl FnOnce(&T) -> Vec<(&'static str, String)>,
    ) {
        let event = match result {
            Ok(value) => metadata(value).into_iter().fold(
                AuditEvent::new(
                    trip_id,
                    audit,
                    event_type,
                    AuditCategory::Approval,
                    AuditOutcome::Success,
                ),
                |event, (key, value)| event.with_metadata(key, value),
            ),
            Err(error) => AuditEvent::new(
                trip_id,
                audit,
                format!("{event_type}_rejected"),
                AuditCategory::Approval,
                outcome_for(error),
            )
            .with_metadata("error_class", error.class())
            .with_metadata("error", error.to_string()),
        };
        self.audit.emit(event);
    }

    fn emit_delegation(
        &self,
        audit: &AuditContext,
        event_type: &str,
        result: &Result<ApprovalDelegation, WorkflowError>,
    ) {
        let event = match result {
            Ok(delegation) => AuditEvent::new(
                None,
                audit,
                event_type,
                AuditCategory::Delegation,
                AuditOutcome::Success,
            )
            .with_metadata("delegation_id", delegation.id.0.clone())
            .with_metadata("delegator", delegation.delegator.0.clone())
            .with_metadata("delegate", delegation.delegate.0.clone())
            .with_metadata("end_date", delegation.end_date.to_string()),
            Err(error) => AuditEvent::new(
                None,
                audit,
                format!("{event_type}_rejected"),
                AuditCategory::Delegation,
                outcome_for(error),
            )
            .with_metadata("error_class", error.class()),
        };
        self.audit.emit(event);
    }
}

impl TripContext {
    fn access<'a>(
        &'a self,
        principal: &'a PersonId,
        permissions: &'a ObjectPermissions,
    ) -> AccessRequest<'a> {
        AccessRequest {
            principal,
            trip: &self.trip,
            owner: &self.owner,
            directory: &self.directory,
            permissions,
            on: self.today,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn outcome_for(error: &WorkflowError) -> AuditOutcome {
    match error {
        WorkflowError::Store(_) => AuditOutcome::Failed,
        _ => AuditOutcome::Rejected,
    }
}

fn recipient(directory: &OrgDirectory, person: &PersonId) -> Recipient {
    Recipient {
        person: person.clone(),
        name: directory.display_name_for(person),
        email: directory.email_for(person).map(str::to_string),
    }
}

fn trip_notification(
    context: &TripContext,
    template: TemplateId,
    level: SecurityLevel,
) -> NotificationRequest {
    NotificationRequest::new(template)
        .with_context("trip_id", context.trip.id.0.clone())
        .with_context("trip_name", context.trip.name.clone())
        .with_context("traveler_name", context.owner.full_name())
        .with_context("start_date", context.trip.start_date.to_string())
        .with_context("end_date", context.trip.end_date.to_string())
        .with_context("level", json!(level.as_u8()))
        .with_context("level_label", level.to_string())
}

fn owner_recipient(context: &TripContext) -> Recipient {
    recipient(&context.directory, &context.owner.person)
}

fn approver_name(context: &TripContext, approval: &TripApproval) -> String {
    match context.directory.approver(&approval.approver) {
        Some(approver) => context.directory.display_name_for(&approver.person),
        None => approval.approver.0.clone(),
    }
}

fn unassigned_reason(error: &WorkflowError, level: SecurityLevel) -> String {
    match error {
        WorkflowError::SelfApproval { .. } => {
            format!("the {level} approver resolved for this trip is the traveler")
        }
        _ => format!("no {level} approver is configured"),
    }
}
