//! Log-only transport.
//!
//! Used when no SMTP relay is configured: each message becomes one `info`
//! event under the `feedwatch::notification` target.

use async_trait::async_trait;
use tracing::info;

use super::Transport;
use crate::Result;

/// Transport that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        info!(target: "feedwatch::notification", recipient, subject, "{}", body);
        Ok(())
    }
}
