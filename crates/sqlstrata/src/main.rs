//! sqlstrata CLI
//!
//! Command-line front end for running migrations. Migrations themselves are
//! defined in Rust and registered at startup; a binary embedding its own
//! registry would populate `build_registry` and reuse everything else here.

use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sqlstrata::prelude::*;

/// Versioned, dialect-aware schema migrations.
#[derive(Parser)]
#[command(name = "sqlstrata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Only run migrations declaring this profile (or none).
    #[arg(short, long)]
    profile: Option<String>,

    /// Only run migrations carrying one of these tags.
    #[arg(short, long)]
    tag: Vec<String>,

    /// Show SQL without executing it.
    #[arg(long)]
    preview: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations in version order.
    Up {
        /// Stop after this version (all pending if not specified).
        #[arg(long)]
        target: Option<i64>,
    },

    /// Revert applied migrations in reverse version order.
    Down {
        /// Revert everything above this version.
        #[arg(long, conflicts_with = "count")]
        target: Option<i64>,

        /// Revert this many migrations from the top.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show migration status.
    List {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Builds the migration registry for this binary.
///
/// Empty here: applications embedding the engine register their own
/// migrations, see the `blog` example.
fn build_registry() -> MigrationRegistry {
    MigrationRegistry::new()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Connect to database
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&cli.database)
        .await?;

    let options = ProcessorOptions::default().preview(cli.preview);
    let processor = Processor::new(pool, options);

    let mut runner = Runner::new(processor, Box::new(SqliteDialect::new()), build_registry());
    if let Some(profile) = cli.profile {
        runner = runner.with_profile(profile);
    }
    if !cli.tag.is_empty() {
        runner = runner.with_tags(cli.tag);
    }

    match cli.command {
        Commands::Up { target } => {
            if cli.preview {
                info!("Preview mode - SQL will be printed but not executed.");
            }
            runner.migrate_up(target).await?;
            if cli.preview {
                for sql in runner.processor().preview_transcript() {
                    println!("{sql};");
                }
            }
            info!("Migration run completed.");
        }

        Commands::Down { target, count } => {
            if cli.preview {
                info!("Preview mode - SQL will be printed but not executed.");
            }
            match (target, count) {
                (Some(target), _) => runner.migrate_down(target).await?,
                (None, Some(count)) => runner.rollback_last(count).await?,
                (None, None) => runner.rollback_last(1).await?,
            }
            if cli.preview {
                for sql in runner.processor().preview_transcript() {
                    println!("{sql};");
                }
            }
            info!("Rollback completed.");
        }

        Commands::List { json } => {
            if json {
                println!("{}", runner.list_migrations_json().await?);
                return Ok(());
            }

            let statuses = runner.list_migrations().await?;

            if statuses.is_empty() {
                info!("No migrations registered or applied.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for status in &statuses {
                    let marker = if status.applied_on.is_some() {
                        "[X]"
                    } else {
                        "[ ]"
                    };
                    let applied = status
                        .applied_on
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "pending".to_string());
                    println!(
                        " {} {} {} ({})",
                        marker, status.version, status.description, applied
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}
