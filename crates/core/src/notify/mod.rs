pub mod email;
pub mod templates;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::traveler::PersonId;

pub use email::{EmailMessage, MailTransport, RecordingMailTransport, TemplateNotifier};
pub use templates::{RenderedTemplate, TemplateCatalog};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    ApprovalRequested,
    ApprovalEscalated,
    TripApproved,
    TripDeclined,
    ApprovalUnassigned,
}

impl TemplateId {
    pub const ALL: [TemplateId; 5] = [
        Self::ApprovalRequested,
        Self::ApprovalEscalated,
        Self::TripApproved,
        Self::TripDeclined,
        Self::ApprovalUnassigned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApprovalRequested => "approval_requested",
            Self::ApprovalEscalated => "approval_escalated",
            Self::TripApproved => "trip_approved",
            Self::TripDeclined => "trip_declined",
            Self::ApprovalUnassigned => "approval_unassigned",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub person: PersonId,
    pub name: String,
    pub email: Option<String>,
}

impl Recipient {
    pub fn address_label(&self) -> String {
        self.email.clone().unwrap_or_else(|| format!("<no address for {}>", self.person.0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub template: TemplateId,
    pub context: BTreeMap<String, Value>,
    pub recipients: Vec<Recipient>,
}

impl NotificationRequest {
    pub fn new(template: TemplateId) -> Self {
        Self { template, context: BTreeMap::new(), recipients: Vec::new() }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        if !self.recipients.iter().any(|existing| existing.person == recipient.person) {
            self.recipients.push(recipient);
        }
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification could not be delivered to: {}", failed.join(", "))]
    PartialFailure { failed: Vec<String> },
    #[error("template `{template}` failed to render: {message}")]
    Template { template: TemplateId, message: String },
    #[error("mail transport failure: {0}")]
    Transport(String),
}

/// Mailer collaborator. Failures are reported, never retried here.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotificationError>;
}

/// Non-fatal notification outcome surfaced to the user who triggered a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationWarning {
    pub template: TemplateId,
    pub message: String,
}

/// Loose address check: one `@`, non-empty local part, dotted domain, no whitespace.
pub fn is_deliverable_address(address: &str) -> bool {
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
    failing_addresses: Arc<HashSet<String>>,
}

impl InMemoryNotifier {
    pub fn failing_for(addresses: Vec<String>) -> Self {
        Self { sent: Arc::default(), failing_addresses: Arc::new(addresses.into_iter().collect()) }
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_templates(&self) -> Vec<TemplateId> {
        self.sent().into_iter().map(|request| request.template).collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotificationError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        let failed: Vec<String> = request
            .recipients
            .iter()
            .filter(|recipient| match &recipient.email {
                Some(email) => self.failing_addresses.contains(email),
                None => true,
            })
            .map(Recipient::address_label)
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::PartialFailure { failed })
        }
    }
}
