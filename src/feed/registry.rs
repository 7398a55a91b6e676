//! Registry of polled sources.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::fetcher::FeedFetcher;
use super::identity::entry_identity;
use super::seen::SeenStore;
use super::types::{EntryPayload, FeedEntry, FetchedFeed, Source};
use crate::config::SourceConfig;
use crate::db::{KvStore, Table};
use crate::{FeedwatchError, Result};

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// The stored source record.
    pub source: Source,
    /// Entries newly marked seen while seeding.
    pub seeded: usize,
}

/// Durable record of configured feeds, keyed by source name.
pub struct SourceRegistry<'a> {
    store: &'a dyn KvStore,
}

impl<'a> SourceRegistry<'a> {
    /// Create a new registry view.
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Register a feed.
    ///
    /// The first registration of a name marks every entry currently in the
    /// feed as seen without notifying, so adding a feed with a long history
    /// does not flood the notification channel. Registering a name that is
    /// already stored under the same URL only refreshes its record: entries
    /// that appeared since the last cycle stay unseen and are notified by the
    /// next one. A changed URL is seeded like a new feed.
    ///
    /// The record is written after seeding, so a registration interrupted
    /// mid-seed is seeded again on the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`FeedwatchError::Registration`] if the name is invalid or the
    /// feed cannot be fetched or parsed, and a store error if the record
    /// cannot be written.
    pub async fn register(
        &self,
        fetcher: &dyn FeedFetcher,
        name: &str,
        url: &str,
    ) -> Result<Registration> {
        validate_name(name)?;
        info!("Registering source {} ({})", name, url);

        let feed = fetcher.fetch(url).await.map_err(|e| match e {
            e if e.is_cycle_fatal() => e,
            e => registration_error(name, e.to_string()),
        })?;

        let FetchedFeed {
            entries,
            parse_error,
            ..
        } = feed;
        if let Some(reason) = parse_error {
            return Err(registration_error(name, reason));
        }

        let known = self.stored_url(name).await?.as_deref() == Some(url);
        let seeded = if known {
            debug!("Source {} already registered, not seeding", name);
            0
        } else {
            self.seed(name, &entries).await?
        };

        let source = Source::new(name, url);
        self.save(&source).await?;

        info!(
            "Source {} registered: {} entries in feed, {} newly marked seen",
            name,
            entries.len(),
            seeded
        );
        Ok(Registration { source, seeded })
    }

    /// Mark every entry of `entries` seen. Returns how many were new.
    async fn seed(&self, name: &str, entries: &[FeedEntry]) -> Result<usize> {
        let seen = SeenStore::new(self.store);
        let mut seeded = 0;
        for entry in entries {
            let identity = match entry_identity(name, entry) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("Skipping entry while seeding: {}", e);
                    continue;
                }
            };
            let payload = EntryPayload::from_feed_entry(name, entry);
            if seen.insert_if_absent(&identity, &payload).await? {
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    /// URL of the stored record for `name`. An undecodable record counts as
    /// absent.
    async fn stored_url(&self, name: &str) -> Result<Option<String>> {
        let Some(value) = self.store.get(Table::Sources, name).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Source>(&value) {
            Ok(source) => Ok(Some(source.url)),
            Err(e) => {
                warn!("Replacing undecodable source record {}: {}", name, e);
                Ok(None)
            }
        }
    }

    /// Snapshot of every registered source.
    ///
    /// Records that no longer decode are skipped with a warning rather than
    /// failing the whole listing.
    pub async fn list(&self) -> Result<Vec<Source>> {
        let rows = self.store.get_all(Table::Sources).await?;
        let mut sources = Vec::with_capacity(rows.len());
        for (name, value) in rows {
            match serde_json::from_str::<Source>(&value) {
                Ok(source) => sources.push(source),
                Err(e) => warn!("Ignoring undecodable source record {}: {}", name, e),
            }
        }
        Ok(sources)
    }

    /// Get a source by name.
    pub async fn get(&self, name: &str) -> Result<Option<Source>> {
        match self.store.get(Table::Sources, name).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Update `last_update` for `name`.
    ///
    /// Returns `false` if no such source is registered.
    pub async fn touch(&self, name: &str, timestamp: DateTime<Utc>) -> Result<bool> {
        let Some(mut source) = self.get(name).await? else {
            return Ok(false);
        };
        source.last_update = timestamp;
        self.save(&source).await?;
        Ok(true)
    }

    async fn save(&self, source: &Source) -> Result<()> {
        let value = serde_json::to_string(source)?;
        self.store.set(Table::Sources, &source.name, &value).await
    }
}

/// Register every configured source.
///
/// A source that fails to register is logged and skipped; it can be added on
/// a later start. Only store failures are returned.
pub async fn register_sources(
    store: &dyn KvStore,
    fetcher: &dyn FeedFetcher,
    sources: &[SourceConfig],
) -> Result<usize> {
    let registry = SourceRegistry::new(store);
    let mut registered = 0;
    for source in sources {
        match registry.register(fetcher, &source.name, &source.url).await {
            Ok(_) => registered += 1,
            Err(e) if e.is_cycle_fatal() => return Err(e),
            Err(e) => warn!("{}", e),
        }
    }
    Ok(registered)
}

/// Names become the prefix of every entry identity, so they must be
/// non-empty and must not contain the `:` separator.
fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(registration_error(name, "name must not be empty"));
    }
    if name.contains(':') {
        return Err(registration_error(name, "name must not contain ':'"));
    }
    Ok(())
}

fn registration_error(name: &str, reason: impl Into<String>) -> FeedwatchError {
    FeedwatchError::Registration {
        name: name.to_string(),
        reason: reason.into(),
    }
}
