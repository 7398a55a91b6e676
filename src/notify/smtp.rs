//! SMTP transport.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::Transport;
use crate::config::NotifyConfig;
use crate::{FeedwatchError, Result};

/// Bound on a single SMTP exchange.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated SMTP sender over implicit TLS.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer from configuration.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| FeedwatchError::Config(format!("invalid notify.sender: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| FeedwatchError::Config(format!("invalid notify.smtp_host: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| FeedwatchError::Delivery(format!("invalid recipient {recipient}: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| FeedwatchError::Delivery(format!("failed to build message: {e}")))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| FeedwatchError::Delivery(format!("failed to send mail: {e}")))?;
        Ok(())
    }
}
