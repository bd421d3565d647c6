use async_trait::async_trait;
use tracing::info;
use tripgate_core::notify::email::{EmailMessage, MailTransport};

/// Transport for operator runs: every rendered email is written to the log
/// instead of leaving the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), String> {
        info!(
            event_name = "mail.logged",
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email rendered"
        );
        Ok(())
    }
}
