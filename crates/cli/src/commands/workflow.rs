use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use tripgate_core::audit::{AuditContext, TracingAuditSink};
use tripgate_core::config::{AppConfig, LoadOptions};
use tripgate_core::notify::{NotificationWarning, TemplateCatalog, TemplateNotifier};
use tripgate_core::{
    ApprovalWorkflow, ApproverId, DelegationId, DelegationRequest, PersonId, SecurityLevel,
    TripApprovalId, TripId, WorkflowError,
};
use tripgate_db::{connect_with_settings, migrations, DbPool, SqlWorkflowStore};

use crate::commands::{CommandError, CommandResult};
use crate::mailer::LogMailTransport;

type CliWorkflow =
    ApprovalWorkflow<SqlWorkflowStore, TemplateNotifier<LogMailTransport>, TracingAuditSink>;

/// Exit code for a transition the workflow refused.
const REJECTED_EXIT_CODE: u8 = 7;

/// Approval workflow operation run against the configured database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowAction {
    Status { trip: String },
    History { trip: String },
    Request { principal: String, trip: String, level: Option<u8> },
    Decide { principal: String, approval: String, approved: bool, comment: Option<String> },
    Invalidate { trip: String },
    Inbox { principal: String },
    Delegate {
        principal: String,
        delegate: String,
        from: NaiveDate,
        until: NaiveDate,
        reason: String,
    },
    RevokeDelegation { principal: String, delegation: String, reason: String },
}

impl WorkflowAction {
    pub fn command(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::History { .. } => "history",
            Self::Request { .. } => "request",
            Self::Decide { .. } => "decide",
            Self::Invalidate { .. } => "invalidate",
            Self::Inbox { .. } => "inbox",
            Self::Delegate { .. } => "delegate",
            Self::RevokeDelegation { .. } => "revoke-delegation",
        }
    }

    fn actor(&self) -> &str {
        match self {
            Self::Request { principal, .. }
            | Self::Decide { principal, .. }
            | Self::Inbox { principal, .. }
            | Self::Delegate { principal, .. }
            | Self::RevokeDelegation { principal, .. } => principal,
            Self::Status { .. } | Self::History { .. } | Self::Invalidate { .. } => "operator",
        }
    }
}

struct Reply {
    message: String,
    data: Value,
}

pub fn run(action: WorkflowAction) -> CommandResult {
    let command = action.command();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let run_result = match build_workflow(&config, pool.clone()) {
            Ok(workflow) => execute(&workflow, &config, action).await,
            Err(error) => Err(error),
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(reply) => CommandResult::success_with_data(command, reply.message, Some(reply.data)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

fn build_workflow(config: &AppConfig, pool: DbPool) -> Result<CliWorkflow, CommandError> {
    let catalog = TemplateCatalog::new(
        config.notifications.subject_prefix.clone(),
        config.notifications.portal_url(),
    )
    .map_err(|error| ("notification_setup", error.to_string(), 3u8))?;

    let mut notifier = TemplateNotifier::new(
        catalog,
        LogMailTransport,
        config.notifications.sender_address.clone(),
    );
    if !config.notifications.enabled {
        notifier = notifier.disabled();
    }

    Ok(ApprovalWorkflow::new(SqlWorkflowStore::new(pool), notifier, TracingAuditSink))
}

async fn execute(
    workflow: &CliWorkflow,
    config: &AppConfig,
    action: WorkflowAction,
) -> Result<Reply, CommandError> {
    let command = action.command();
    let audit = AuditContext::generated(action.actor());

    let reply = match action {
        WorkflowAction::Status { trip } => {
            let status =
                workflow.get_approval_status(&TripId(trip.clone())).await.map_err(rejected)?;
            let mut message = format!("{trip} is {}", status.stage);
            if status.is_stalled() {
                message.push_str(" with no pending request");
            }
            Reply {
                message,
                data: json!({ "status": to_data(&status)?, "stalled": status.is_stalled() }),
            }
        }
        WorkflowAction::History { trip } => {
            let history =
                workflow.approval_history(&TripId(trip.clone())).await.map_err(rejected)?;
            Reply {
                message: format!("{} approval rows for {trip}", history.len()),
                data: to_data(&history)?,
            }
        }
        WorkflowAction::Request { principal, trip, level } => {
            let level = requested_level(config, level)?;
            let outcome = workflow
                .request_approval(&PersonId(principal), &TripId(trip), level, &audit)
                .await
                .map_err(rejected)?;
            let summary = if outcome.value.is_granted() {
                format!(
                    "{level} was already granted as {}; trip approval is complete",
                    outcome.value.id.0
                )
            } else {
                format!(
                    "requested {level} approval {} from {}",
                    outcome.value.id.0, outcome.value.approver.0
                )
            };
            let message = with_warnings(summary, &outcome.warnings);
            Reply { message, data: to_data(&outcome)? }
        }
        WorkflowAction::Decide { principal, approval, approved, comment } => {
            let outcome = workflow
                .decide(&PersonId(principal), &TripApprovalId(approval), approved, comment, &audit)
                .await
                .map_err(rejected)?;
            let decision = &outcome.value;
            let level = decision.approval.security_level;
            let summary = if !approved {
                format!("declined at {level}; the trip will not be approved")
            } else if decision.approval_complete {
                format!("approved at {level}; trip approval is complete")
            } else if let Some(next) = &decision.escalated {
                format!(
                    "approved at {level}; escalated to {} as {}",
                    next.approver.0, next.id.0
                )
            } else if let Some(stalled) = decision.stalled_at {
                format!("approved at {level}; no approver is configured for {stalled}")
            } else {
                format!("approved at {level}")
            };
            Reply { message: with_warnings(summary, &outcome.warnings), data: to_data(&outcome)? }
        }
        WorkflowAction::Invalidate { trip } => {
            let invalidated = workflow
                .invalidate_trip_approval(&TripId(trip.clone()), &audit)
                .await
                .map_err(rejected)?;
            Reply {
                message: format!("invalidated {invalidated} approval rows for {trip}"),
                data: json!({ "trip_id": trip, "invalidated_rows": invalidated }),
            }
        }
        WorkflowAction::Inbox { principal } => {
            let inbox = workflow
                .pending_approvals_for(&PersonId(principal.clone()))
                .await
                .map_err(rejected)?;
            Reply {
                message: format!("{} pending approvals for {principal}", inbox.len()),
                data: to_data(&inbox)?,
            }
        }
        WorkflowAction::Delegate { principal, delegate, from, until, reason } => {
            let request = DelegationRequest {
                delegate: ApproverId(delegate),
                start_date: from,
                end_date: until,
                reason,
            };
            let delegation = workflow
                .create_delegation(&PersonId(principal), request, &audit)
                .await
                .map_err(rejected)?;
            Reply {
                message: format!(
                    "delegation {} hands {} to {} from {} until {}",
                    delegation.id.0,
                    delegation.delegator.0,
                    delegation.delegate.0,
                    delegation.start_date,
                    delegation.end_date
                ),
                data: to_data(&delegation)?,
            }
        }
        WorkflowAction::RevokeDelegation { principal, delegation, reason } => {
            let revoked = workflow
                .revoke_delegation(&PersonId(principal), &DelegationId(delegation), &reason, &audit)
                .await
                .map_err(rejected)?;
            Reply {
                message: format!("delegation {} revoked", revoked.id.0),
                data: to_data(&revoked)?,
            }
        }
    };

    info!(
        event_name = "cli.workflow.completed",
        command,
        correlation_id = %audit.correlation_id,
        "workflow command completed"
    );
    Ok(reply)
}

fn requested_level(config: &AppConfig, level: Option<u8>) -> Result<SecurityLevel, CommandError> {
    match level {
        Some(raw) => SecurityLevel::try_from(raw)
            .map_err(|error| ("invalid_argument", error.to_string(), 2u8)),
        None => config
            .workflow
            .default_level()
            .map_err(|error| ("config_validation", error.to_string(), 2u8)),
    }
}

fn rejected(error: WorkflowError) -> CommandError {
    match error {
        WorkflowError::Store(_) => ("persistence", error.to_string(), 4u8),
        other => (other.class(), other.to_string(), REJECTED_EXIT_CODE),
    }
}

fn with_warnings(message: String, warnings: &[NotificationWarning]) -> String {
    if warnings.is_empty() {
        return message;
    }
    let details = warnings.iter().map(|warning| warning.message.as_str()).collect::<Vec<_>>();
    format!("{message}; notification warnings: {}", details.join("; "))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 3u8))
}
