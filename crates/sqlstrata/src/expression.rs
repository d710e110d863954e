//! The dialect-neutral expression model.
//!
//! An [`Expression`] describes exactly one schema or data mutation. It is
//! pure data: beyond [`Expression::validate`] it carries no behavior, and a
//! migration's expressions execute in strict insertion order. The runner
//! validates every expression before handing it to a dialect, so no
//! partially-valid expression ever reaches SQL generation.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::schema::{ColumnDef, ForeignKeyDef, Value};

/// Body of a table-level constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Unique constraint over the named columns.
    Unique {
        /// Columns that form the unique set.
        columns: Vec<String>,
    },
    /// Check constraint with a raw SQL predicate.
    Check {
        /// The predicate expression.
        expression: String,
    },
}

/// A single schema or data mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Create a named schema (namespace).
    CreateSchema {
        /// Schema name.
        name: String,
    },

    /// Drop a named schema.
    DropSchema {
        /// Schema name.
        name: String,
    },

    /// Create a new table.
    CreateTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnDef>,
        /// Composite primary key columns (empty when defined inline).
        primary_key: Vec<String>,
        /// Whether to use IF NOT EXISTS.
        if_not_exists: bool,
    },

    /// Drop a table.
    DropTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        name: String,
        /// Whether to use IF EXISTS.
        if_exists: bool,
    },

    /// Rename a table.
    RenameTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },

    /// Redefine an existing column (type, nullability, default).
    AlterColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// The new full column definition.
        column: ColumnDef,
    },

    /// Drop a column.
    DropColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Create an index.
    CreateIndex {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Index name.
        name: String,
        /// Table name.
        table: String,
        /// Columns to index.
        columns: Vec<String>,
        /// Whether this is a unique index.
        unique: bool,
        /// Whether to use IF NOT EXISTS.
        if_not_exists: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Index name.
        name: String,
        /// Table name (required by some dialects).
        table: Option<String>,
        /// Whether to use IF EXISTS.
        if_exists: bool,
    },

    /// Add a foreign key constraint.
    CreateForeignKey {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Referencing table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKeyDef,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Add a unique or check constraint.
    CreateConstraint {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
        /// Constraint body.
        kind: ConstraintKind,
    },

    /// Drop a named constraint.
    DropConstraint {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Execute a raw SQL statement.
    ExecuteSql {
        /// The statement text.
        sql: String,
    },

    /// Insert rows. Each row is an ordered list of (column, value) pairs.
    InsertData {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Rows to insert.
        rows: Vec<Vec<(String, Value)>>,
    },

    /// Update rows. An empty filter updates all rows.
    UpdateData {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column assignments.
        set: Vec<(String, Value)>,
        /// Equality filter; empty means all rows.
        filter: Vec<(String, Value)>,
    },

    /// Delete rows. An empty filter deletes all rows.
    DeleteData {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Equality filter; empty means all rows.
        filter: Vec<(String, Value)>,
    },
}

fn require(kind: &'static str, field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MigrateError::Validation {
            kind,
            field,
            message: "identifier must not be empty".to_string(),
        });
    }
    Ok(())
}

fn require_some(kind: &'static str, field: &'static str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(MigrateError::Validation {
            kind,
            field,
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_column(kind: &'static str, column: &ColumnDef) -> Result<()> {
    require(kind, "column.name", &column.name)
}

fn validate_pairs(kind: &'static str, field: &'static str, pairs: &[(String, Value)]) -> Result<()> {
    for (name, _) in pairs {
        require(kind, field, name)?;
    }
    Ok(())
}

impl Expression {
    // Convenience constructors; schema qualifiers and flags default off and
    // can be set by building the variant directly.

    /// Creates a `CreateSchema` expression.
    #[must_use]
    pub fn create_schema(name: impl Into<String>) -> Self {
        Self::CreateSchema { name: name.into() }
    }

    /// Creates a `DropSchema` expression.
    #[must_use]
    pub fn drop_schema(name: impl Into<String>) -> Self {
        Self::DropSchema { name: name.into() }
    }

    /// Creates a `CreateTable` expression with an inline primary key.
    #[must_use]
    pub fn create_table(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self::CreateTable {
            schema: None,
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            if_not_exists: false,
        }
    }

    /// Creates a `DropTable` expression.
    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::DropTable {
            schema: None,
            name: name.into(),
            if_exists: false,
        }
    }

    /// Creates a `RenameTable` expression.
    #[must_use]
    pub fn rename_table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::RenameTable {
            schema: None,
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates an `AddColumn` expression.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnDef) -> Self {
        Self::AddColumn {
            schema: None,
            table: table.into(),
            column,
        }
    }

    /// Creates an `AlterColumn` expression.
    #[must_use]
    pub fn alter_column(table: impl Into<String>, column: ColumnDef) -> Self {
        Self::AlterColumn {
            schema: None,
            table: table.into(),
            column,
        }
    }

    /// Creates a `DropColumn` expression.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            schema: None,
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a `RenameColumn` expression.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            schema: None,
            table: table.into(),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates a `CreateIndex` expression.
    #[must_use]
    pub fn create_index(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        unique: bool,
    ) -> Self {
        Self::CreateIndex {
            schema: None,
            name: name.into(),
            table: table.into(),
            columns,
            unique,
            if_not_exists: false,
        }
    }

    /// Creates a `DropIndex` expression.
    #[must_use]
    pub fn drop_index(name: impl Into<String>) -> Self {
        Self::DropIndex {
            schema: None,
            name: name.into(),
            table: None,
            if_exists: false,
        }
    }

    /// Creates a `CreateForeignKey` expression.
    #[must_use]
    pub fn create_foreign_key(table: impl Into<String>, foreign_key: ForeignKeyDef) -> Self {
        Self::CreateForeignKey {
            schema: None,
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a `DropForeignKey` expression.
    #[must_use]
    pub fn drop_foreign_key(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DropForeignKey {
            schema: None,
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a unique `CreateConstraint` expression.
    #[must_use]
    pub fn unique_constraint(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self::CreateConstraint {
            schema: None,
            table: table.into(),
            name: name.into(),
            kind: ConstraintKind::Unique { columns },
        }
    }

    /// Creates a check `CreateConstraint` expression.
    #[must_use]
    pub fn check_constraint(
        table: impl Into<String>,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self::CreateConstraint {
            schema: None,
            table: table.into(),
            name: name.into(),
            kind: ConstraintKind::Check {
                expression: expression.into(),
            },
        }
    }

    /// Creates a `DropConstraint` expression.
    #[must_use]
    pub fn drop_constraint(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DropConstraint {
            schema: None,
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates an `ExecuteSql` expression.
    #[must_use]
    pub fn execute_sql(sql: impl Into<String>) -> Self {
        Self::ExecuteSql { sql: sql.into() }
    }

    /// Creates an `InsertData` expression.
    #[must_use]
    pub fn insert_data(table: impl Into<String>, rows: Vec<Vec<(String, Value)>>) -> Self {
        Self::InsertData {
            schema: None,
            table: table.into(),
            rows,
        }
    }

    /// Creates an `UpdateData` expression. An empty filter updates all rows.
    #[must_use]
    pub fn update_data(
        table: impl Into<String>,
        set: Vec<(String, Value)>,
        filter: Vec<(String, Value)>,
    ) -> Self {
        Self::UpdateData {
            schema: None,
            table: table.into(),
            set,
            filter,
        }
    }

    /// Creates a `DeleteData` expression. An empty filter deletes all rows.
    #[must_use]
    pub fn delete_data(table: impl Into<String>, filter: Vec<(String, Value)>) -> Self {
        Self::DeleteData {
            schema: None,
            table: table.into(),
            filter,
        }
    }

    /// Returns the stable kind tag used for dispatch and error context.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "CreateSchema",
            Self::DropSchema { .. } => "DropSchema",
            Self::CreateTable { .. } => "CreateTable",
            Self::DropTable { .. } => "DropTable",
            Self::RenameTable { .. } => "RenameTable",
            Self::AddColumn { .. } => "AddColumn",
            Self::AlterColumn { .. } => "AlterColumn",
            Self::DropColumn { .. } => "DropColumn",
            Self::RenameColumn { .. } => "RenameColumn",
            Self::CreateIndex { .. } => "CreateIndex",
            Self::DropIndex { .. } => "DropIndex",
            Self::CreateForeignKey { .. } => "CreateForeignKey",
            Self::DropForeignKey { .. } => "DropForeignKey",
            Self::CreateConstraint { .. } => "CreateConstraint",
            Self::DropConstraint { .. } => "DropConstraint",
            Self::ExecuteSql { .. } => "ExecuteSql",
            Self::InsertData { .. } => "InsertData",
            Self::UpdateData { .. } => "UpdateData",
            Self::DeleteData { .. } => "DeleteData",
        }
    }

    /// Validates required fields, failing with [`MigrateError::Validation`]
    /// naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        match self {
            Self::CreateSchema { name } | Self::DropSchema { name } => {
                require(kind, "name", name)
            }

            Self::CreateTable {
                name,
                columns,
                primary_key,
                ..
            } => {
                require(kind, "name", name)?;
                require_some(kind, "columns", columns.len())?;
                for column in columns {
                    validate_column(kind, column)?;
                }
                for pk in primary_key {
                    require(kind, "primary_key", pk)?;
                    if !columns.iter().any(|c| &c.name == pk) {
                        return Err(MigrateError::Validation {
                            kind,
                            field: "primary_key",
                            message: format!("column '{pk}' is not defined"),
                        });
                    }
                }
                Ok(())
            }

            Self::DropTable { name, .. } => require(kind, "name", name),

            Self::RenameTable {
                old_name, new_name, ..
            } => {
                require(kind, "old_name", old_name)?;
                require(kind, "new_name", new_name)
            }

            Self::AddColumn { table, column, .. } | Self::AlterColumn { table, column, .. } => {
                require(kind, "table", table)?;
                validate_column(kind, column)
            }

            Self::DropColumn { table, column, .. } => {
                require(kind, "table", table)?;
                require(kind, "column", column)
            }

            Self::RenameColumn {
                table,
                old_name,
                new_name,
                ..
            } => {
                require(kind, "table", table)?;
                require(kind, "old_name", old_name)?;
                require(kind, "new_name", new_name)
            }

            Self::CreateIndex {
                name,
                table,
                columns,
                ..
            } => {
                require(kind, "name", name)?;
                require(kind, "table", table)?;
                require_some(kind, "columns", columns.len())?;
                for column in columns {
                    require(kind, "columns", column)?;
                }
                Ok(())
            }

            Self::DropIndex { name, .. } => require(kind, "name", name),

            Self::CreateForeignKey {
                table, foreign_key, ..
            } => {
                require(kind, "table", table)?;
                require(kind, "foreign_key.name", &foreign_key.name)?;
                require(kind, "foreign_key.referenced_table", &foreign_key.referenced_table)?;
                require_some(kind, "foreign_key.columns", foreign_key.columns.len())?;
                require_some(
                    kind,
                    "foreign_key.referenced_columns",
                    foreign_key.referenced_columns.len(),
                )?;
                if foreign_key.columns.len() != foreign_key.referenced_columns.len() {
                    return Err(MigrateError::Validation {
                        kind,
                        field: "foreign_key.columns",
                        message: format!(
                            "{} local column(s) reference {} column(s)",
                            foreign_key.columns.len(),
                            foreign_key.referenced_columns.len()
                        ),
                    });
                }
                Ok(())
            }

            Self::DropForeignKey { table, name, .. }
            | Self::DropConstraint { table, name, .. } => {
                require(kind, "table", table)?;
                require(kind, "name", name)
            }

            Self::CreateConstraint {
                table,
                name,
                kind: body,
                ..
            } => {
                require(kind, "table", table)?;
                require(kind, "name", name)?;
                match body {
                    ConstraintKind::Unique { columns } => {
                        require_some(kind, "columns", columns.len())?;
                        for column in columns {
                            require(kind, "columns", column)?;
                        }
                        Ok(())
                    }
                    ConstraintKind::Check { expression } => {
                        require(kind, "expression", expression)
                    }
                }
            }

            Self::ExecuteSql { sql } => require(kind, "sql", sql),

            Self::InsertData { table, rows, .. } => {
                require(kind, "table", table)?;
                require_some(kind, "rows", rows.len())?;
                for row in rows {
                    require_some(kind, "rows", row.len())?;
                    validate_pairs(kind, "rows", row)?;
                }
                Ok(())
            }

            Self::UpdateData {
                table, set, filter, ..
            } => {
                require(kind, "table", table)?;
                require_some(kind, "set", set.len())?;
                validate_pairs(kind, "set", set)?;
                validate_pairs(kind, "filter", filter)
            }

            Self::DeleteData { table, filter, .. } => {
                require(kind, "table", table)?;
                validate_pairs(kind, "filter", filter)
            }
        }
    }

    /// Returns a human-readable description of this expression.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateSchema { name } => format!("create schema '{name}'"),
            Self::DropSchema { name } => format!("drop schema '{name}'"),
            Self::CreateTable { name, .. } => format!("create table '{name}'"),
            Self::DropTable { name, .. } => format!("drop table '{name}'"),
            Self::RenameTable {
                old_name, new_name, ..
            } => format!("rename table '{old_name}' to '{new_name}'"),
            Self::AddColumn { table, column, .. } => {
                format!("add column '{}' to '{table}'", column.name)
            }
            Self::AlterColumn { table, column, .. } => {
                format!("alter column '{}' on '{table}'", column.name)
            }
            Self::DropColumn { table, column, .. } => {
                format!("drop column '{column}' from '{table}'")
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
                ..
            } => format!("rename column '{old_name}' to '{new_name}' on '{table}'"),
            Self::CreateIndex { name, table, .. } => {
                format!("create index '{name}' on '{table}'")
            }
            Self::DropIndex { name, .. } => format!("drop index '{name}'"),
            Self::CreateForeignKey {
                table, foreign_key, ..
            } => format!("add foreign key '{}' to '{table}'", foreign_key.name),
            Self::DropForeignKey { table, name, .. } => {
                format!("drop foreign key '{name}' from '{table}'")
            }
            Self::CreateConstraint { table, name, .. } => {
                format!("add constraint '{name}' to '{table}'")
            }
            Self::DropConstraint { table, name, .. } => {
                format!("drop constraint '{name}' from '{table}'")
            }
            Self::ExecuteSql { .. } => "execute raw sql".to_string(),
            Self::InsertData { table, rows, .. } => {
                format!("insert {} row(s) into '{table}'", rows.len())
            }
            Self::UpdateData { table, .. } => format!("update rows in '{table}'"),
            Self::DeleteData { table, .. } => format!("delete rows from '{table}'"),
        }
    }
}
