//! Durable record of entries already processed.

use super::types::EntryPayload;
use crate::db::{KvStore, Table};
use crate::Result;

/// Set of seen entry identities, global across sources.
///
/// Identities already embed the source name, so one table serves every
/// source without collisions.
pub struct SeenStore<'a> {
    store: &'a dyn KvStore,
}

impl<'a> SeenStore<'a> {
    /// Create a new store view.
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Whether `identity` has been seen.
    pub async fn has(&self, identity: &str) -> Result<bool> {
        self.store.exists(Table::Entries, identity).await
    }

    /// Record `identity`, overwriting any previous payload.
    pub async fn put(&self, identity: &str, payload: &EntryPayload) -> Result<()> {
        let value = serde_json::to_string(payload)?;
        self.store.set(Table::Entries, identity, &value).await
    }

    /// Record `identity` unless it is already present.
    ///
    /// Returns `true` if this call marked the entry seen. This is the only
    /// write the detector uses, so an identity can be claimed exactly once.
    pub async fn insert_if_absent(&self, identity: &str, payload: &EntryPayload) -> Result<bool> {
        let value = serde_json::to_string(payload)?;
        self.store
            .set_if_absent(Table::Entries, identity, &value)
            .await
    }

    /// Stored payload for `identity`.
    pub async fn get(&self, identity: &str) -> Result<Option<EntryPayload>> {
        match self.store.get(Table::Entries, identity).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// All seen identities.
    pub async fn identities(&self) -> Result<Vec<String>> {
        let rows = self.store.get_all(Table::Entries).await?;
        Ok(rows.into_iter().map(|(key, _)| key).collect())
    }
}
