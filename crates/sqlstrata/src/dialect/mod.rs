//! Database dialect implementations.
//!
//! Each dialect translates expressions into exact SQL text for one database
//! system. Generation is a pure function of the expression: for a fixed
//! dialect, identical input always yields byte-identical SQL, which is what
//! makes golden tests and preview mode trustworthy. Mutations a dialect
//! cannot express fail with [`MigrateError::NotSupported`] rather than
//! degrading silently.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{MigrateError, Result};
use crate::expression::Expression;
use crate::schema::{ColumnDef, DefaultValue, SqlType, Value};

/// Trait for database-specific SQL generation.
pub trait Dialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Maximum identifier length; longer identifiers are truncated on quoting.
    fn max_identifier_length(&self) -> usize;

    /// Returns the auto-increment keyword, empty if the dialect uses
    /// type-level auto-increment instead.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Whether DDL participates in transactions on this dialect.
    ///
    /// When false, per-migration atomicity cannot include schema changes and
    /// callers must treat partial failure accordingly.
    fn supports_transactional_ddl(&self) -> bool;

    /// Maps a semantic type to the dialect's native type name.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Generates the SQL statements for one expression.
    fn generate(&self, expression: &Expression) -> Result<Vec<String>>;

    /// Quotes an identifier, truncating it at the dialect maximum.
    fn quote_identifier(&self, name: &str) -> String {
        let truncated: String = name.chars().take(self.max_identifier_length()).collect();
        format!("\"{}\"", truncated.replace('"', "\"\""))
    }

    /// Renders an optionally schema-qualified object name.
    fn qualified_name(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(name)),
            None => self.quote_identifier(name),
        }
    }

    /// Renders a default value; dialects override for native booleans.
    fn render_default(&self, default: &DefaultValue) -> Option<String> {
        default.to_sql()
    }

    /// Renders a data literal; dialects override for native booleans.
    fn render_value(&self, value: &Value) -> String {
        value.to_sql()
    }

    /// Renders one column definition.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                let keyword = self.auto_increment_keyword();
                if !keyword.is_empty() {
                    parts.push(keyword.to_string());
                }
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            parts.push(format!("DEFAULT {default_sql}"));
        }

        parts.join(" ")
    }

    /// Renders an equality WHERE clause; empty filter yields no clause.
    fn where_clause(&self, filter: &[(String, Value)]) -> String {
        if filter.is_empty() {
            return String::new();
        }
        let predicates: Vec<String> = filter
            .iter()
            .map(|(column, value)| {
                if matches!(value, Value::Null) {
                    format!("{} IS NULL", self.quote_identifier(column))
                } else {
                    format!(
                        "{} = {}",
                        self.quote_identifier(column),
                        self.render_value(value)
                    )
                }
            })
            .collect();
        format!(" WHERE {}", predicates.join(" AND "))
    }

    /// Renders INSERT statements, one per row.
    fn insert_data_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        rows: &[Vec<(String, Value)>],
    ) -> Vec<String> {
        rows.iter()
            .map(|row| {
                let columns: Vec<String> = row
                    .iter()
                    .map(|(column, _)| self.quote_identifier(column))
                    .collect();
                let values: Vec<String> = row
                    .iter()
                    .map(|(_, value)| self.render_value(value))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.qualified_name(schema, table),
                    columns.join(", "),
                    values.join(", ")
                )
            })
            .collect()
    }

    /// Renders an UPDATE statement.
    fn update_data_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        set: &[(String, Value)],
        filter: &[(String, Value)],
    ) -> String {
        let assignments: Vec<String> = set
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.quote_identifier(column),
                    self.render_value(value)
                )
            })
            .collect();
        format!(
            "UPDATE {} SET {}{}",
            self.qualified_name(schema, table),
            assignments.join(", "),
            self.where_clause(filter)
        )
    }

    /// Renders a DELETE statement.
    fn delete_data_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        filter: &[(String, Value)],
    ) -> String {
        format!(
            "DELETE FROM {}{}",
            self.qualified_name(schema, table),
            self.where_clause(filter)
        )
    }
}

/// Builds the `NotSupported` error for an expression/dialect pair.
pub(crate) fn not_supported(dialect: &dyn Dialect, expression: &Expression) -> MigrateError {
    MigrateError::NotSupported {
        kind: expression.kind(),
        dialect: dialect.name(),
    }
}
