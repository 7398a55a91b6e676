//! Key-value store abstraction over the database.
//!
//! The feed engine only ever needs string keys mapped to JSON strings in two
//! logical tables. Keeping that behind [`KvStore`] lets the poll loop run
//! against SQLite in production and against wrappers or fakes in tests.

use async_trait::async_trait;

use super::Database;
use crate::Result;

/// Logical tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Registered sources, keyed by source name.
    Sources,
    /// Seen entries, keyed by entry identity.
    Entries,
}

impl Table {
    /// SQL table name.
    pub fn name(self) -> &'static str {
        match self {
            Table::Sources => "sources",
            Table::Entries => "entries",
        }
    }
}

/// Durable string-to-string mapping split into [`Table`]s.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Every key/value pair of a table, in no particular order.
    async fn get_all(&self, table: Table) -> Result<Vec<(String, String)>>;

    /// Value stored under `key`, if any.
    async fn get(&self, table: Table, key: &str) -> Result<Option<String>>;

    /// Whether `key` is present.
    async fn exists(&self, table: Table, key: &str) -> Result<bool>;

    /// Insert or overwrite `key`.
    async fn set(&self, table: Table, key: &str, value: &str) -> Result<()>;

    /// Insert `key` only if it is absent.
    ///
    /// Returns `true` when this call created the record. The check and the
    /// write are a single statement, so two writers racing on the same key
    /// can never both observe `true`.
    async fn set_if_absent(&self, table: Table, key: &str, value: &str) -> Result<bool>;
}

#[async_trait]
impl KvStore for Database {
    async fn get_all(&self, table: Table) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as(&format!("SELECT key, value FROM {}", table.name()))
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    async fn get(&self, table: Table, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar(&format!("SELECT value FROM {} WHERE key = $1", table.name()))
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(value)
    }

    async fn exists(&self, table: Table, key: &str) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE key = $1)",
            table.name()
        ))
        .bind(key)
        .fetch_one(self.pool())
        .await?;
        Ok(found != 0)
    }

    async fn set(&self, table: Table, key: &str, value: &str) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (key, value) VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
            table.name()
        ))
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_if_absent(&self, table: Table, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (key, value) VALUES ($1, $2)",
            table.name()
        ))
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
