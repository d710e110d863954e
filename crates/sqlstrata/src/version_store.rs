//! The persisted ledger of applied migration versions.
//!
//! The ledger table is the sole source of truth for "applied" status. The
//! store keeps no connection and no cache of its own: every read and write
//! goes through the [`Processor`], so ledger writes issued between a
//! migration's statements and its commit land in the same transaction as
//! the migration itself.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::error::{MigrateError, Result};
use crate::processor::Processor;
use crate::schema::escape_string;

/// Default name of the ledger table.
pub const DEFAULT_VERSION_TABLE: &str = "sqlstrata_versions";

/// Quotes a table name for direct embedding in ledger SQL.
pub(crate) fn quote_table(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Parses the ledger's stored timestamp, accepting both RFC 3339 and
/// SQLite's `datetime('now')` format.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

/// One row of the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct VersionRecord {
    /// The applied migration version.
    pub version: i64,
    /// When it was applied.
    pub applied_on: DateTime<Utc>,
    /// Free-text description.
    pub description: String,
}

/// View over the reserved ledger table.
#[derive(Debug, Clone)]
pub struct VersionStore {
    table: String,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionStore {
    /// Creates a store over the default ledger table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Creates a store over a custom ledger table.
    #[must_use]
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Returns the ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the ledger table if absent. Idempotent.
    pub async fn ensure_schema(&self, processor: &mut Processor) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  version BIGINT PRIMARY KEY,\n  applied_on TEXT NOT NULL,\n  description TEXT NOT NULL\n)",
            quote_table(&self.table)
        );
        processor.execute(&sql).await?;
        Ok(())
    }

    /// Returns the set of applied versions, read fresh from the ledger.
    ///
    /// A missing ledger table reads as empty, which keeps preview runs from
    /// touching the database.
    pub async fn applied_versions(&self, processor: &mut Processor) -> Result<BTreeSet<i64>> {
        if !processor.table_exists(&self.table).await? {
            return Ok(BTreeSet::new());
        }
        let sql = format!(
            "SELECT version FROM {} ORDER BY version",
            quote_table(&self.table)
        );
        let rows = processor.query_rows(&sql).await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    /// Returns all ledger rows, ascending by version.
    pub async fn applied_records(&self, processor: &mut Processor) -> Result<Vec<VersionRecord>> {
        if !processor.table_exists(&self.table).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT version, applied_on, description FROM {} ORDER BY version",
            quote_table(&self.table)
        );
        let rows = processor.query_rows(&sql).await?;
        Ok(rows
            .iter()
            .map(|row| VersionRecord {
                version: row.get::<i64, _>(0),
                applied_on: parse_timestamp(&row.get::<String, _>(1)),
                description: row.get::<String, _>(2),
            })
            .collect())
    }

    /// Whether the given version is recorded as applied.
    pub async fn is_applied(&self, processor: &mut Processor, version: i64) -> Result<bool> {
        Ok(self.applied_versions(processor).await?.contains(&version))
    }

    /// Records a version as applied, inside the current transaction.
    pub async fn mark_applied(
        &self,
        processor: &mut Processor,
        version: i64,
        description: &str,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (version, applied_on, description) VALUES ({version}, '{}', '{}')",
            quote_table(&self.table),
            Utc::now().to_rfc3339(),
            escape_string(description)
        );
        processor.execute(&sql).await?;
        Ok(())
    }

    /// Removes a version's ledger row, inside the current transaction.
    pub async fn mark_unapplied(&self, processor: &mut Processor, version: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {version}",
            quote_table(&self.table)
        );
        let affected = processor.execute(&sql).await?;
        if affected == 0 && !processor.options().preview {
            return Err(MigrateError::NotApplied(version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorOptions;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();

        store.ensure_schema(&mut processor).await.unwrap();
        store.ensure_schema(&mut processor).await.unwrap();
        assert!(processor.table_exists(DEFAULT_VERSION_TABLE).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_table_reads_as_empty() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();

        assert!(store.applied_versions(&mut processor).await.unwrap().is_empty());
        assert!(store.applied_records(&mut processor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_and_read_applied() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();
        store.ensure_schema(&mut processor).await.unwrap();

        store.mark_applied(&mut processor, 2, "add email").await.unwrap();
        store.mark_applied(&mut processor, 1, "create users").await.unwrap();

        let versions: Vec<i64> = store
            .applied_versions(&mut processor)
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(versions, vec![1, 2]);

        let records = store.applied_records(&mut processor).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].version, 1);
        assert_eq!(records[0].description, "create users");
        assert!(store.is_applied(&mut processor, 2).await.unwrap());
        assert!(!store.is_applied(&mut processor, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_unapplied() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();
        store.ensure_schema(&mut processor).await.unwrap();

        store.mark_applied(&mut processor, 1, "create users").await.unwrap();
        store.mark_unapplied(&mut processor, 1).await.unwrap();
        assert!(!store.is_applied(&mut processor, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_unapplying_unknown_version_fails() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();
        store.ensure_schema(&mut processor).await.unwrap();

        let err = store.mark_unapplied(&mut processor, 42).await.unwrap_err();
        assert!(matches!(err, MigrateError::NotApplied(42)));
    }

    #[tokio::test]
    async fn test_description_escaping() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::new();
        store.ensure_schema(&mut processor).await.unwrap();

        store
            .mark_applied(&mut processor, 1, "add user's table")
            .await
            .unwrap();
        let records = store.applied_records(&mut processor).await.unwrap();
        assert_eq!(records[0].description, "add user's table");
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let pool = create_test_pool().await;
        let mut processor = Processor::new(pool, ProcessorOptions::default());
        let store = VersionStore::with_table("app_versions");
        store.ensure_schema(&mut processor).await.unwrap();

        assert!(processor.table_exists("app_versions").await.unwrap());
        assert!(!processor.table_exists(DEFAULT_VERSION_TABLE).await.unwrap());
    }
}
