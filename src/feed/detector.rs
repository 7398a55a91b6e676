//! Detection of new entries for one source.

use tracing::{debug, warn};

use super::fetcher::FeedFetcher;
use super::identity::entry_identity;
use super::seen::SeenStore;
use super::types::{Entry, EntryPayload, Source};
use crate::db::KvStore;
use crate::Result;

/// Finds the entries of a source that have not been seen before.
pub struct UpdateDetector<'a> {
    store: &'a dyn KvStore,
    fetcher: &'a dyn FeedFetcher,
}

impl<'a> UpdateDetector<'a> {
    /// Create a new detector.
    pub fn new(store: &'a dyn KvStore, fetcher: &'a dyn FeedFetcher) -> Self {
        Self { store, fetcher }
    }

    /// Fetch `source` and return its unseen entries in feed order.
    ///
    /// Every returned entry has already been marked seen when this returns.
    /// The mark is written before the caller gets a chance to notify, so a
    /// crash can lose a notification but never repeat one.
    ///
    /// # Errors
    ///
    /// [`FeedwatchError::FetchFailed`](crate::FeedwatchError::FetchFailed)
    /// when the feed cannot be retrieved, or a store error when the seen
    /// store cannot be read or written.
    pub async fn detect(&self, source: &Source) -> Result<Vec<Entry>> {
        let feed = self.fetcher.fetch(&source.url).await?;

        if let Some(reason) = &feed.parse_error {
            warn!("Source {} returned an unparseable feed: {}", source.name, reason);
            return Ok(Vec::new());
        }

        debug!(
            "Source {}: {} entries in feed",
            source.name,
            feed.entries.len()
        );

        let seen = SeenStore::new(self.store);
        let mut new_entries = Vec::new();
        for item in &feed.entries {
            let identity = match entry_identity(&source.name, item) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            if seen.has(&identity).await? {
                continue;
            }

            let payload = EntryPayload::from_feed_entry(&source.name, item);
            // Lost race or duplicate id within the same document.
            if !seen.insert_if_absent(&identity, &payload).await? {
                continue;
            }

            debug!("New entry {}: {}", identity, payload.title);
            new_entries.push(Entry { identity, payload });
        }

        Ok(new_entries)
    }
}
