//! PostgreSQL dialect.
//!
//! Covers the full expression set: schemas, ALTER COLUMN, post-creation
//! constraints and foreign keys. Auto-increment primary keys map to
//! SERIAL/BIGSERIAL. Identifiers are truncated at PostgreSQL's 63-byte
//! maximum when quoted.

use crate::error::Result;
use crate::expression::{ConstraintKind, Expression};
use crate::schema::{ColumnDef, DefaultValue, ForeignKeyDef, SqlType, Value};

use super::Dialect;

/// PostgreSQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn create_table_sql(
        &self,
        schema: Option<&str>,
        name: &str,
        columns: &[ColumnDef],
        primary_key: &[String],
        if_not_exists: bool,
    ) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.qualified_name(schema, name));
        sql.push_str(" (\n  ");

        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        sql.push_str(&column_defs.join(",\n  "));

        let declared_inline = columns.iter().any(|c| c.primary_key);
        if !primary_key.is_empty() && !declared_inline {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            sql.push_str(",\n  PRIMARY KEY (");
            sql.push_str(&quoted.join(", "));
            sql.push(')');
        }

        sql.push_str("\n)");
        sql
    }

    /// ALTER COLUMN is decomposed into type, nullability, and default
    /// statements, in that fixed order.
    fn alter_column_sql(&self, schema: Option<&str>, table: &str, column: &ColumnDef) -> Vec<String> {
        let table_name = self.qualified_name(schema, table);
        let column_name = self.quote_identifier(&column.name);

        let mut statements = vec![format!(
            "ALTER TABLE {table_name} ALTER COLUMN {column_name} TYPE {}",
            self.type_name(&column.sql_type)
        )];

        if column.nullable {
            statements.push(format!(
                "ALTER TABLE {table_name} ALTER COLUMN {column_name} DROP NOT NULL"
            ));
        } else {
            statements.push(format!(
                "ALTER TABLE {table_name} ALTER COLUMN {column_name} SET NOT NULL"
            ));
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            statements.push(format!(
                "ALTER TABLE {table_name} ALTER COLUMN {column_name} SET DEFAULT {default_sql}"
            ));
        }

        statements
    }

    fn foreign_key_sql(&self, schema: Option<&str>, table: &str, fk: &ForeignKeyDef) -> String {
        let columns: Vec<String> = fk.columns.iter().map(|c| self.quote_identifier(c)).collect();
        let referenced: Vec<String> = fk
            .referenced_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.qualified_name(schema, table),
            self.quote_identifier(&fk.name),
            columns.join(", "),
            self.qualified_name(schema, &fk.referenced_table),
            referenced.join(", "),
            fk.on_delete.as_sql(),
            fk.on_update.as_sql(),
        )
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn max_identifier_length(&self) -> usize {
        63
    }

    fn auto_increment_keyword(&self) -> &'static str {
        // Auto-increment is type-level (SERIAL/BIGSERIAL).
        ""
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::DateTime | SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(precision, scale) => format!("DECIMAL({precision}, {scale})"),
            SqlType::Blob | SqlType::Binary(_) => "BYTEA".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    fn render_default(&self, default: &DefaultValue) -> Option<String> {
        match default {
            DefaultValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            other => other.to_sql(),
        }
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            other => other.to_sql(),
        }
    }

    fn column_definition(&self, column: &ColumnDef) -> String {
        // SERIAL types replace the plain integer type for auto-increment keys.
        let data_type = if column.auto_increment && column.primary_key {
            match column.sql_type {
                SqlType::Integer | SqlType::SmallInt => "SERIAL".to_string(),
                SqlType::BigInt => "BIGSERIAL".to_string(),
                ref other => self.type_name(other),
            }
        } else {
            self.type_name(&column.sql_type)
        };

        let mut sql = format!("{} {data_type}", self.quote_identifier(&column.name));

        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            sql.push_str(&format!(" DEFAULT {default_sql}"));
        }

        sql
    }

    fn generate(&self, expression: &Expression) -> Result<Vec<String>> {
        match expression {
            Expression::CreateSchema { name } => {
                Ok(vec![format!("CREATE SCHEMA {}", self.quote_identifier(name))])
            }

            Expression::DropSchema { name } => {
                Ok(vec![format!("DROP SCHEMA {}", self.quote_identifier(name))])
            }

            Expression::CreateTable {
                schema,
                name,
                columns,
                primary_key,
                if_not_exists,
            } => Ok(vec![self.create_table_sql(
                schema.as_deref(),
                name,
                columns,
                primary_key,
                *if_not_exists,
            )]),

            Expression::DropTable {
                schema,
                name,
                if_exists,
            } => {
                let mut sql = String::from("DROP TABLE ");
                if *if_exists {
                    sql.push_str("IF EXISTS ");
                }
                sql.push_str(&self.qualified_name(schema.as_deref(), name));
                Ok(vec![sql])
            }

            Expression::RenameTable {
                schema,
                old_name,
                new_name,
            } => Ok(vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                self.qualified_name(schema.as_deref(), old_name),
                self.quote_identifier(new_name)
            )]),

            Expression::AddColumn {
                schema,
                table,
                column,
            } => Ok(vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualified_name(schema.as_deref(), table),
                self.column_definition(column)
            )]),

            Expression::AlterColumn {
                schema,
                table,
                column,
            } => Ok(self.alter_column_sql(schema.as_deref(), table, column)),

            Expression::DropColumn {
                schema,
                table,
                column,
            } => Ok(vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.qualified_name(schema.as_deref(), table),
                self.quote_identifier(column)
            )]),

            Expression::RenameColumn {
                schema,
                table,
                old_name,
                new_name,
            } => Ok(vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.qualified_name(schema.as_deref(), table),
                self.quote_identifier(old_name),
                self.quote_identifier(new_name)
            )]),

            Expression::CreateIndex {
                schema,
                name,
                table,
                columns,
                unique,
                if_not_exists,
            } => {
                let mut sql = String::from("CREATE ");
                if *unique {
                    sql.push_str("UNIQUE ");
                }
                sql.push_str("INDEX ");
                if *if_not_exists {
                    sql.push_str("IF NOT EXISTS ");
                }
                sql.push_str(&self.quote_identifier(name));
                sql.push_str(" ON ");
                sql.push_str(&self.qualified_name(schema.as_deref(), table));
                sql.push_str(" (");
                let quoted: Vec<String> =
                    columns.iter().map(|c| self.quote_identifier(c)).collect();
                sql.push_str(&quoted.join(", "));
                sql.push(')');
                Ok(vec![sql])
            }

            Expression::DropIndex {
                schema,
                name,
                if_exists,
                ..
            } => {
                let mut sql = String::from("DROP INDEX ");
                if *if_exists {
                    sql.push_str("IF EXISTS ");
                }
                sql.push_str(&self.qualified_name(schema.as_deref(), name));
                Ok(vec![sql])
            }

            Expression::CreateForeignKey {
                schema,
                table,
                foreign_key,
            } => Ok(vec![self.foreign_key_sql(schema.as_deref(), table, foreign_key)]),

            Expression::DropForeignKey {
                schema,
                table,
                name,
            }
            | Expression::DropConstraint {
                schema,
                table,
                name,
            } => Ok(vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified_name(schema.as_deref(), table),
                self.quote_identifier(name)
            )]),

            Expression::CreateConstraint {
                schema,
                table,
                name,
                kind,
            } => {
                let body = match kind {
                    ConstraintKind::Unique { columns } => {
                        let quoted: Vec<String> =
                            columns.iter().map(|c| self.quote_identifier(c)).collect();
                        format!("UNIQUE ({})", quoted.join(", "))
                    }
                    ConstraintKind::Check { expression } => format!("CHECK ({expression})"),
                };
                Ok(vec![format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {body}",
                    self.qualified_name(schema.as_deref(), table),
                    self.quote_identifier(name)
                )])
            }

            Expression::ExecuteSql { sql } => Ok(vec![sql.clone()]),

            Expression::InsertData {
                schema,
                table,
                rows,
            } => Ok(self.insert_data_sql(schema.as_deref(), table, rows)),

            Expression::UpdateData {
                schema,
                table,
                set,
                filter,
            } => Ok(vec![self.update_data_sql(
                schema.as_deref(),
                table,
                set,
                filter,
            )]),

            Expression::DeleteData {
                schema,
                table,
                filter,
            } => Ok(vec![self.delete_data_sql(schema.as_deref(), table, filter)]),
        }
    }
}
