use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::templates::TemplateCatalog;
use super::{is_deliverable_address, NotificationError, NotificationRequest, Notifier};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), String>;
}

/// Renders each request through the template catalog and hands one message per
/// recipient to the transport. Delivery is attempted for every recipient even
/// when earlier ones fail.
pub struct TemplateNotifier<T> {
    catalog: TemplateCatalog,
    transport: T,
    sender_address: String,
    enabled: bool,
}

impl<T: MailTransport> TemplateNotifier<T> {
    pub fn new(catalog: TemplateCatalog, transport: T, sender_address: impl Into<String>) -> Self {
        Self { catalog, transport, sender_address: sender_address.into(), enabled: true }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: MailTransport> Notifier for TemplateNotifier<T> {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotificationError> {
        if !self.enabled {
            info!(
                event_name = "notify.skipped",
                template = %request.template,
                recipients = request.recipients.len(),
                "notifications disabled, skipping delivery"
            );
            return Ok(());
        }

        let mut failed = Vec::new();
        for recipient in &request.recipients {
            let Some(address) =
                recipient.email.as_deref().filter(|address| is_deliverable_address(address))
            else {
                warn!(
                    event_name = "notify.recipient_rejected",
                    template = %request.template,
                    person = %recipient.person.0,
                    "recipient has no deliverable address"
                );
                failed.push(recipient.address_label());
                continue;
            };

            let rendered =
                self.catalog.render(request.template, &request.context, &recipient.name)?;
            let message = EmailMessage {
                from: self.sender_address.clone(),
                to: address.to_string(),
                subject: rendered.subject,
                body: rendered.body,
            };

            match self.transport.deliver(&message).await {
                Ok(()) => info!(
                    event_name = "notify.delivered",
                    template = %request.template,
                    to = %message.to,
                    "notification delivered"
                ),
                Err(error) => {
                    warn!(
                        event_name = "notify.delivery_failed",
                        template = %request.template,
                        to = %message.to,
                        error = %error,
                        "notification delivery failed"
                    );
                    failed.push(address.to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::PartialFailure { failed })
        }
    }
}

/// Transport that keeps delivered messages in memory.
#[derive(Clone, Default)]
pub struct RecordingMailTransport {
    delivered: Arc<Mutex<Vec<EmailMessage>>>,
    rejected_addresses: Vec<String>,
}

impl RecordingMailTransport {
    pub fn rejecting(addresses: Vec<String>) -> Self {
        Self { delivered: Arc::default(), rejected_addresses: addresses }
    }

    pub fn delivered(&self) -> Vec<EmailMessage> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), String> {
        if self.rejected_addresses.contains(&message.to) {
            return Err(format!("mailbox {} rejected the message", message.to));
        }
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordingMailTransport, TemplateNotifier};
    use crate::domain::traveler::PersonId;
    use crate::notify::{
        NotificationError, NotificationRequest, Notifier, Recipient, TemplateCatalog, TemplateId,
    };

    fn unassigned_request() -> NotificationRequest {
        NotificationRequest::new(TemplateId::ApprovalUnassigned)
            .with_context("trip_id", "TRIP-9")
            .with_context("trip_name", "Regional workshop")
            .with_context("level_label", "level 2")
            .with_context("reason", "no level 2 approver is configured")
    }

    fn recipient(id: &str, email: Option<&str>) -> Recipient {
        Recipient {
            person: PersonId(id.to_string()),
            name: id.to_string(),
            email: email.map(str::to_string),
        }
    }

    fn notifier(transport: RecordingMailTransport) -> TemplateNotifier<RecordingMailTransport> {
        let catalog =
            TemplateCatalog::new("[Tripgate]", "https://trips.example.org").expect("catalog");
        TemplateNotifier::new(catalog, transport, "no-reply@example.org")
    }

    #[tokio::test]
    async fn delivers_rendered_message_per_recipient() {
        let notifier = notifier(RecordingMailTransport::default());
        let request = unassigned_request()
            .with_recipient(recipient("amina", Some("amina@example.org")))
            .with_recipient(recipient("joseph", Some("joseph@example.org")));

        notifier.send(&request).await.expect("delivered");

        let delivered = notifier.transport().delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].from, "no-reply@example.org");
        assert_eq!(delivered[0].subject, "[Tripgate] No approver available for Regional workshop");
        assert!(delivered[1].body.starts_with("Dear joseph,"));
    }

    #[tokio::test]
    async fn bad_addresses_do_not_stop_remaining_recipients() {
        let notifier =
            notifier(RecordingMailTransport::rejecting(vec!["full@example.org".to_string()]));
        let request = unassigned_request()
            .with_recipient(recipient("nobody", Some("not-an-address")))
            .with_recipient(recipient("full", Some("full@example.org")))
            .with_recipient(recipient("amina", Some("amina@example.org")));

        let error = notifier.send(&request).await.expect_err("partial failure");
        assert_eq!(
            error,
            NotificationError::PartialFailure {
                failed: vec!["not-an-address".to_string(), "full@example.org".to_string()]
            }
        );
        assert_eq!(notifier.transport().delivered().len(), 1);
    }

    #[tokio::test]
    async fn disabled_notifier_skips_delivery() {
        let notifier = notifier(RecordingMailTransport::default()).disabled();
        let request =
            unassigned_request().with_recipient(recipient("amina", Some("amina@example.org")));

        notifier.send(&request).await.expect("skipped");
        assert!(notifier.transport().delivered().is_empty());
    }
}
