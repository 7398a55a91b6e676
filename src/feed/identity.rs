//! Stable identities for feed entries.

use super::types::FeedEntry;
use crate::{FeedwatchError, Result};

/// Token naming an entry within its feed: the native id, else the link.
fn identity_token(entry: &FeedEntry) -> Option<&str> {
    entry
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .or_else(|| entry.link.as_deref().filter(|link| !link.is_empty()))
}

/// Identity of `entry` within `source_name`: `"{source_name}:{token}"`.
///
/// Fails with [`FeedwatchError::MalformedEntry`] when the entry has neither
/// an id nor a link.
pub fn entry_identity(source_name: &str, entry: &FeedEntry) -> Result<String> {
    identity_token(entry)
        .map(|token| format!("{source_name}:{token}"))
        .ok_or_else(|| FeedwatchError::MalformedEntry {
            source_name: source_name.to_string(),
            reason: format!("entry {:?} has neither id nor link", entry.title),
        })
}
