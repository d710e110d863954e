//! Versioned, dialect-aware schema migrations.
//!
//! `sqlstrata` tracks which versioned schema and data changes have been
//! applied to a database, compiles pending changes into dialect-exact SQL,
//! and applies them transactionally in strict version order, where:
//! - Migrations are plain data: ordered `up`/`down` expression lists
//! - SQL generation is dialect-aware (SQLite, PostgreSQL) and deterministic
//! - Each migration commits atomically with its own ledger entry
//! - Runs can be filtered by profile and tags, and previewed without
//!   touching the database
//!
//! # Architecture
//!
//! The engine consists of several components:
//!
//! - **Expressions** - Dialect-neutral schema/data mutations like
//!   `CreateTable`, `AddColumn`, `CreateIndex`
//! - **Dialects** - Database-specific SQL generation
//! - **Processor** - Executes SQL, owns transactions and preview mode
//! - **Version store** - The persisted ledger of applied versions
//! - **Runner** - Filters, diffs and applies migrations in order
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlstrata::prelude::*;
//!
//! pub struct CreateUsers;
//!
//! impl Migration for CreateUsers {
//!     const VERSION: i64 = 1;
//!     const DESCRIPTION: &'static str = "create users";
//!
//!     fn up() -> Vec<Expression> {
//!         vec![Expression::create_table(
//!             "users",
//!             vec![
//!                 ColumnDef::new("id", SqlType::BigInt)
//!                     .primary_key()
//!                     .auto_increment(),
//!                 ColumnDef::new("username", SqlType::Varchar(255))
//!                     .not_null()
//!                     .unique(),
//!                 ColumnDef::new("created_at", SqlType::Timestamp)
//!                     .not_null()
//!                     .default(DefaultValue::Expression("CURRENT_TIMESTAMP".into())),
//!             ],
//!         )]
//!     }
//!
//!     fn down() -> Vec<Expression> {
//!         vec![Expression::drop_table("users")]
//!     }
//! }
//!
//! let mut registry = MigrationRegistry::new();
//! registry.register_migration::<CreateUsers>();
//!
//! let processor = Processor::new(pool, ProcessorOptions::default());
//! let mut runner = Runner::new(processor, Box::new(SqliteDialect::new()), registry);
//! runner.migrate_up(None).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending migrations
//! sqlstrata up
//!
//! # Revert everything above version 20240101
//! sqlstrata down --target 20240101
//!
//! # Show migration status
//! sqlstrata list
//! ```

pub mod dialect;
pub mod error;
pub mod expression;
pub mod processor;
pub mod runner;
pub mod schema;
pub mod version_store;

pub use runner::Migration;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{Dialect, PostgresDialect, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::expression::{ConstraintKind, Expression};
    pub use crate::processor::{Processor, ProcessorOptions};
    pub use crate::runner::{
        Migration, MigrationRegistry, MigrationScript, MigrationStatus, RegisteredMigration,
        Runner, RunnerState,
    };
    pub use crate::schema::{
        ColumnDef, DefaultValue, ForeignKeyAction, ForeignKeyDef, SqlType, Value,
    };
    pub use crate::version_store::{VersionRecord, VersionStore, DEFAULT_VERSION_TABLE};
}
