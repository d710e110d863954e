//! End-to-end walkthrough: three migrations applied to an in-memory
//! database, then rolled back to version 1.
//!
//! Run with `cargo run --example blog`.

use sqlx::sqlite::SqlitePoolOptions;
use sqlstrata::prelude::*;

struct CreateUsers;

impl Migration for CreateUsers {
    const VERSION: i64 = 1;
    const DESCRIPTION: &'static str = "create users table";

    fn up() -> Vec<Expression> {
        vec![Expression::create_table(
            "Users",
            vec![
                ColumnDef::new("Id", SqlType::Integer)
                    .primary_key()
                    .auto_increment(),
                ColumnDef::new("Name", SqlType::Varchar(255)).not_null(),
            ],
        )]
    }

    fn down() -> Vec<Expression> {
        vec![Expression::drop_table("Users")]
    }
}

struct AddEmail;

impl Migration for AddEmail {
    const VERSION: i64 = 2;
    const DESCRIPTION: &'static str = "add email column";

    fn up() -> Vec<Expression> {
        vec![Expression::add_column(
            "Users",
            ColumnDef::new("Email", SqlType::Varchar(255)),
        )]
    }

    fn down() -> Vec<Expression> {
        vec![Expression::drop_column("Users", "Email")]
    }
}

struct IndexEmail;

impl Migration for IndexEmail {
    const VERSION: i64 = 3;
    const DESCRIPTION: &'static str = "index email column";

    fn up() -> Vec<Expression> {
        vec![Expression::create_index(
            "IX_Users_Email",
            "Users",
            vec!["Email".to_string()],
            false,
        )]
    }

    fn down() -> Vec<Expression> {
        vec![Expression::drop_index("IX_Users_Email")]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;

    let mut registry = MigrationRegistry::new();
    registry.register_migration::<CreateUsers>();
    registry.register_migration::<AddEmail>();
    registry.register_migration::<IndexEmail>();

    let processor = Processor::new(pool, ProcessorOptions::default());
    let mut runner = Runner::new(processor, Box::new(SqliteDialect::new()), registry);

    runner.migrate_up(None).await?;
    println!("After migrate up:");
    for status in runner.list_migrations().await? {
        println!(
            "  {} {} - {}",
            if status.applied_on.is_some() { "[X]" } else { "[ ]" },
            status.version,
            status.description
        );
    }

    runner.migrate_down(1).await?;
    println!("After migrate down to version 1:");
    for status in runner.list_migrations().await? {
        println!(
            "  {} {} - {}",
            if status.applied_on.is_some() { "[X]" } else { "[ ]" },
            status.version,
            status.description
        );
    }

    Ok(())
}
