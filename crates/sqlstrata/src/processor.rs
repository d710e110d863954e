//! Statement execution and transaction ownership.
//!
//! The [`Processor`] holds the one open connection pool for a run and owns
//! its transaction boundaries: no other component issues SQL directly. In
//! preview mode, statements are logged and collected in a transcript
//! instead of executed; reads (existence checks, ledger queries) still go
//! to the database so a preview reflects real pending state.

use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::schema::escape_string;

/// Execution configuration for a run.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Abort any single statement that runs longer than this.
    pub statement_timeout: Duration,
    /// Generate and log SQL without executing it.
    pub preview: bool,
    /// Skip comment-only statements instead of sending them to the driver.
    pub strip_comments: bool,
    /// One transaction per migration (default) vs one per run.
    pub transaction_per_migration: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(30),
            preview: false,
            strip_comments: false,
            transaction_per_migration: true,
        }
    }
}

impl ProcessorOptions {
    /// Sets the per-statement timeout.
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Enables preview mode.
    #[must_use]
    pub fn preview(mut self, enabled: bool) -> Self {
        self.preview = enabled;
        self
    }

    /// Enables skipping of comment-only statements.
    #[must_use]
    pub fn strip_comments(mut self, enabled: bool) -> Self {
        self.strip_comments = enabled;
        self
    }

    /// Chooses one transaction per migration (true) or per run (false).
    #[must_use]
    pub fn transaction_per_migration(mut self, enabled: bool) -> Self {
        self.transaction_per_migration = enabled;
        self
    }
}

fn is_comment_only(sql: &str) -> bool {
    let mut saw_comment = false;
    for line in sql.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("--") {
            saw_comment = true;
        } else {
            return false;
        }
    }
    saw_comment
}

/// Executes SQL against the open connection and owns its transactions.
pub struct Processor {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    options: ProcessorOptions,
    transcript: Vec<String>,
}

impl Processor {
    /// Creates a processor over an open pool.
    #[must_use]
    pub fn new(pool: SqlitePool, options: ProcessorOptions) -> Self {
        Self {
            pool,
            tx: None,
            options,
            transcript: Vec::new(),
        }
    }

    /// Returns the execution options.
    #[must_use]
    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Returns the SQL collected in preview mode, in execution order.
    #[must_use]
    pub fn preview_transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Whether a transaction is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Opens a transaction. Fails if one is already open.
    pub async fn begin(&mut self) -> Result<()> {
        if self.options.preview {
            return Ok(());
        }
        if self.tx.is_some() {
            return Err(MigrateError::TransactionState(
                "transaction is already open",
            ));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    /// Commits the open transaction. Fails if none is open.
    pub async fn commit(&mut self) -> Result<()> {
        if self.options.preview {
            return Ok(());
        }
        match self.tx.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(MigrateError::TransactionState("no transaction to commit")),
        }
    }

    /// Rolls back the open transaction. A no-op when none is open, so error
    /// paths can call it unconditionally.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.options.preview {
            return Ok(());
        }
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    /// Executes one statement and returns the number of rows affected.
    ///
    /// Runs inside the open transaction when there is one. In preview mode
    /// the statement is logged and recorded instead.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        if self.options.strip_comments && is_comment_only(sql) {
            debug!(sql = %sql, "skipping comment-only statement");
            return Ok(0);
        }

        if self.options.preview {
            info!(sql = %sql, "preview");
            self.transcript.push(sql.to_string());
            return Ok(0);
        }

        debug!(sql = %sql, "executing statement");
        let limit = self.options.statement_timeout;
        let outcome = if let Some(tx) = self.tx.as_mut() {
            timeout(limit, sqlx::query(sql).execute(&mut **tx)).await
        } else {
            timeout(limit, sqlx::query(sql).execute(&self.pool)).await
        };

        match outcome {
            Ok(Ok(result)) => Ok(result.rows_affected()),
            Ok(Err(source)) => Err(MigrateError::Statement {
                sql: sql.to_string(),
                source,
            }),
            Err(_) => Err(MigrateError::Timeout {
                sql: sql.to_string(),
                timeout: limit,
            }),
        }
    }

    /// Runs a read query and returns the rows. Reads execute even in
    /// preview mode.
    pub async fn query_rows(&mut self, sql: &str) -> Result<Vec<SqliteRow>> {
        debug!(sql = %sql, "querying");
        let rows = if let Some(tx) = self.tx.as_mut() {
            sqlx::query(sql).fetch_all(&mut **tx).await?
        } else {
            sqlx::query(sql).fetch_all(&self.pool).await?
        };
        Ok(rows)
    }

    /// Whether a table with the given name exists.
    pub async fn table_exists(&mut self, name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '{}'",
            escape_string(name)
        );
        Ok(!self.query_rows(&sql).await?.is_empty())
    }

    /// Whether a column exists on the given table.
    pub async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let rows = self.query_rows(&sql).await?;
        Ok(rows
            .iter()
            .any(|row| row.get::<String, _>("name") == column))
    }

    /// Whether an index with the given name exists.
    pub async fn index_exists(&mut self, name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = '{}'",
            escape_string(name)
        );
        Ok(!self.query_rows(&sql).await?.is_empty())
    }

    /// Whether a schema (attached database) with the given name exists.
    pub async fn schema_exists(&mut self, name: &str) -> Result<bool> {
        let rows = self.query_rows("PRAGMA database_list").await?;
        Ok(rows.iter().any(|row| row.get::<String, _>("name") == name))
    }
}
