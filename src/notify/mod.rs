//! Notification of new entries.
//!
//! [`Notifier`] turns one batch of new entries into one message and hands it
//! to a [`Transport`].

mod log;
mod smtp;

pub use self::log::LogTransport;
pub use self::smtp::SmtpMailer;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::NotifyConfig;
use crate::feed::Entry;
use crate::Result;

/// Width of the separator line between entries in a message body.
const SEPARATOR_WIDTH: usize = 50;

/// Outbound message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message.
    ///
    /// Failures are reported as
    /// [`FeedwatchError::Delivery`](crate::FeedwatchError::Delivery); the
    /// caller does not retry.
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()>;
}

/// Formats and dispatches one notification per batch of new entries.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    recipient: String,
}

impl Notifier {
    /// Create a notifier delivering to `recipient`.
    pub fn new(transport: Arc<dyn Transport>, recipient: impl Into<String>) -> Self {
        Self {
            transport,
            recipient: recipient.into(),
        }
    }

    /// Build the notifier described by the configuration.
    ///
    /// Without an SMTP host, messages go to the log.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = if config.smtp_enabled() {
            Arc::new(SmtpMailer::from_config(config)?)
        } else {
            info!("No SMTP host configured, notifications will be logged");
            Arc::new(LogTransport)
        };
        Ok(Self::new(transport, config.recipient.clone()))
    }

    /// Send one message listing every entry of `entries`.
    ///
    /// An empty batch sends nothing.
    pub async fn notify(&self, source_name: &str, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let (subject, body) = format_message(source_name, entries);
        self.transport.send(&subject, &body, &self.recipient).await?;

        info!(
            "Notified {} new entr{} from {}",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            source_name
        );
        Ok(())
    }
}

/// Subject and body of the notification for one batch.
pub fn format_message(source_name: &str, entries: &[Entry]) -> (String, String) {
    let subject = format!("RSS Updates from {source_name}");

    let mut body = format!("New updates from {source_name}:\n\n");
    let separator = "-".repeat(SEPARATOR_WIDTH);
    for entry in entries {
        let payload = &entry.payload;
        // Writing to a String cannot fail.
        let _ = writeln!(body, "Title: {}", payload.title);
        let _ = writeln!(body, "Link: {}", payload.link);
        let _ = writeln!(body, "Published: {}", payload.published);
        body.push_str(&separator);
        body.push('\n');
    }

    (subject, body)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::feed::{EntryPayload, FeedEntry};
    use crate::FeedwatchError;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for Outbox {
        async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
            if self.fail {
                return Err(FeedwatchError::Delivery("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push((
                subject.to_string(),
                body.to_string(),
                recipient.to_string(),
            ));
            Ok(())
        }
    }

    fn entry(id: &str, title: &str) -> Entry {
        let item = FeedEntry::new(title)
            .with_id(id)
            .with_link(format!("https://example.com/{id}"))
            .with_published("2025-01-01T00:00:00+00:00");
        Entry {
            identity: format!("S:{id}"),
            payload: EntryPayload::from_feed_entry("S", &item),
        }
    }

    #[test]
    fn test_format_message() {
        let (subject, body) = format_message("PANews", &[entry("1", "First")]);

        assert_eq!(subject, "RSS Updates from PANews");
        let expected = format!(
            "New updates from PANews:\n\n\
             Title: First\n\
             Link: https://example.com/1\n\
             Published: 2025-01-01T00:00:00+00:00\n\
             {}\n",
            "-".repeat(50)
        );
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn test_notify_sends_one_message_per_batch() {
        let outbox = Arc::new(Outbox::default());
        let notifier = Notifier::new(outbox.clone(), "me@example.com");

        let batch = vec![entry("1", "One"), entry("2", "Two"), entry("3", "Three")];
        notifier.notify("S", &batch).await.unwrap();

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (_, body, recipient) = &sent[0];
        assert_eq!(recipient, "me@example.com");
        assert!(body.contains("Title: One"));
        assert!(body.contains("Title: Two"));
        assert!(body.contains("Title: Three"));
    }

    #[tokio::test]
    async fn test_notify_empty_batch_sends_nothing() {
        let outbox = Arc::new(Outbox::default());
        let notifier = Notifier::new(outbox.clone(), "me@example.com");

        notifier.notify("S", &[]).await.unwrap();
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_reports_delivery_error() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Outbox::default()
        });
        let notifier = Notifier::new(outbox, "me@example.com");

        let err = notifier.notify("S", &[entry("1", "One")]).await.unwrap_err();
        assert!(matches!(err, FeedwatchError::Delivery(_)));
        assert!(!err.is_cycle_fatal());
    }

    #[test]
    fn test_from_config_without_smtp_uses_log() {
        let notifier = Notifier::from_config(&NotifyConfig::default()).unwrap();
        assert_eq!(notifier.recipient, "");
    }
}
