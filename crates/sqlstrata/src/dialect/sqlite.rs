//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: altering a column in place,
//! adding or dropping foreign keys, and check constraints on existing
//! tables all require the table-recreation strategy, which rewrites user
//! data and is outside the scope of a single expression. Those expressions
//! fail with `NotSupported` here. Unique constraints on existing tables
//! lower to unique indexes, which is how SQLite models them.

use crate::error::Result;
use crate::expression::{ConstraintKind, Expression};
use crate::schema::{ColumnDef, SqlType};

use super::{not_supported, Dialect};

/// SQLite migration dialect. The executable reference dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
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

        // Composite primary key, unless already declared inline.
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

    fn drop_table_sql(&self, schema: Option<&str>, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.qualified_name(schema, name));
        sql
    }

    fn create_index_sql(
        &self,
        schema: Option<&str>,
        name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
        if_not_exists: bool,
    ) -> String {
        let mut sql = String::from("CREATE ");
        if unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        // In SQLite the index lives in the table's schema; the ON clause
        // takes the bare table name.
        sql.push_str(&self.qualified_name(schema, name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');
        sql
    }

    fn drop_index_sql(&self, schema: Option<&str>, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP INDEX ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.qualified_name(schema, name));
        sql
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn max_identifier_length(&self) -> usize {
        // SQLite imposes no practical identifier limit.
        usize::MAX
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt | SqlType::Boolean => {
                "INTEGER".to_string()
            }
            SqlType::Text
            | SqlType::Varchar(_)
            | SqlType::Char(_)
            | SqlType::Date
            | SqlType::Time
            | SqlType::DateTime
            | SqlType::Timestamp
            | SqlType::Json
            | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) => "NUMERIC".to_string(),
            SqlType::Blob | SqlType::Binary(_) => "BLOB".to_string(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    fn generate(&self, expression: &Expression) -> Result<Vec<String>> {
        match expression {
            Expression::CreateSchema { .. }
            | Expression::DropSchema { .. }
            | Expression::AlterColumn { .. }
            | Expression::CreateForeignKey { .. }
            | Expression::DropForeignKey { .. } => Err(not_supported(self, expression)),

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
            } => Ok(vec![self.drop_table_sql(schema.as_deref(), name, *if_exists)]),

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

            // SQLite 3.35.0+.
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
            } => Ok(vec![self.create_index_sql(
                schema.as_deref(),
                name,
                table,
                columns,
                *unique,
                *if_not_exists,
            )]),

            Expression::DropIndex {
                schema,
                name,
                if_exists,
                ..
            } => Ok(vec![self.drop_index_sql(schema.as_deref(), name, *if_exists)]),

            Expression::CreateConstraint {
                schema,
                table,
                name,
                kind,
            } => match kind {
                ConstraintKind::Unique { columns } => Ok(vec![self.create_index_sql(
                    schema.as_deref(),
                    name,
                    table,
                    columns,
                    true,
                    false,
                )]),
                ConstraintKind::Check { .. } => Err(not_supported(self, expression)),
            },

            // Unique constraints lowered to indexes above; dropping mirrors that.
            Expression::DropConstraint { schema, name, .. } => {
                Ok(vec![self.drop_index_sql(schema.as_deref(), name, false)])
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
