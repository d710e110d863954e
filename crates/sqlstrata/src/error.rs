//! Error types for the migration engine.

use std::time::Duration;

/// Errors that can occur while validating, generating, or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// An expression failed validation before any SQL was generated.
    #[error("invalid {kind} expression: {field}: {message}")]
    Validation {
        /// The expression kind (e.g. "CreateTable").
        kind: &'static str,
        /// The missing or malformed field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The active dialect cannot express the requested mutation.
    #[error("{kind} is not supported by the {dialect} dialect")]
    NotSupported {
        /// The expression kind.
        kind: &'static str,
        /// The dialect that refused it.
        dialect: &'static str,
    },

    /// The database rejected a generated statement.
    #[error("statement failed: {sql}")]
    Statement {
        /// The failing SQL text.
        sql: String,
        /// The underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A statement exceeded the configured timeout.
    #[error("statement timed out after {timeout:?}: {sql}")]
    Timeout {
        /// The SQL text that was still running.
        sql: String,
        /// The configured statement timeout.
        timeout: Duration,
    },

    /// A migration aborted mid-application.
    ///
    /// Wraps the underlying validation, generation, or statement error with
    /// the failing version and the position of the expression within it.
    #[error("migration {version} failed at expression {index} ({kind}): {source}")]
    Execution {
        /// The version of the failing migration.
        version: i64,
        /// Zero-based position of the failing expression.
        index: usize,
        /// The expression kind.
        kind: &'static str,
        /// The wrapped cause.
        #[source]
        source: Box<MigrateError>,
    },

    /// Two selected migrations share the same version.
    #[error("duplicate migration version {0}")]
    VersionConflict(i64),

    /// Another runner holds the advisory run lock for this database.
    #[error("another migration run is already in progress")]
    AlreadyRunning,

    /// Rollback was requested for a migration without down expressions.
    #[error("migration {0} has no down expressions and cannot be rolled back")]
    NoDownMigration(i64),

    /// The ledger does not record the version as applied.
    #[error("version {0} is not recorded as applied")]
    NotApplied(i64),

    /// Transaction misuse inside the processor.
    #[error("transaction error: {0}")]
    TransactionState(&'static str),

    /// Database error outside any specific statement.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error while reporting migration status.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
