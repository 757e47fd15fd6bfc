//! oxide-evolve CLI
//!
//! Brings a database in line with the tables declared in a schema file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_evolve::prelude::*;

/// Declarative schema evolution: no migration files, just the schema you want.
#[derive(Parser)]
#[command(name = "oxide-evolve")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (sqlite:, postgres:, mysql:).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// JSON file declaring the tables.
    #[arg(short, long, env = "OXIDE_EVOLVE_SCHEMA", default_value = "schema.json")]
    schema_file: PathBuf,

    /// Schema (namespace) to reconcile instead of the connection default.
    #[arg(short, long)]
    namespace: Option<String>,

    /// Table to leave alone (repeatable).
    #[arg(short, long = "ignore", value_name = "TABLE")]
    ignore: Vec<String>,

    /// Also compare column defaults.
    #[arg(long)]
    diff_defaults: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes the database needs.
    Plan {
        /// Print the plan as JSON instead of SQL.
        #[arg(long)]
        json: bool,
    },

    /// Apply the changes the database needs.
    Apply {
        /// Commit without asking.
        #[arg(short, long, conflicts_with = "test")]
        yes: bool,

        /// Run every statement, then roll back, without asking.
        #[arg(short, long)]
        test: bool,
    },
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

    let registry = load_schema_file(&cli.schema_file)?;
    info!(
        tables = registry.len(),
        schema_file = %cli.schema_file.display(),
        "Loaded declared tables"
    );

    match connect(&cli.database).await? {
        Connection::Postgres(db) => run(&db, &cli, &registry).await,
        Connection::MySql(db) => run(&db, &cli, &registry).await,
        Connection::Sqlite(db) => run(&db, &cli, &registry).await,
    }
}

async fn run<D: Database>(db: &D, cli: &Cli, registry: &Registry) -> anyhow::Result<()> {
    let mut options = PlanOptions::new().diff_defaults(cli.diff_defaults);
    if let Some(namespace) = &cli.namespace {
        options = options.schema(namespace);
    }
    for table in &cli.ignore {
        options = options.ignore(table);
    }

    let plan = plan_changes(db, registry, &options).await?;

    match cli.command {
        Commands::Plan { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else if plan.is_empty() {
                info!("Nothing to do... Your database is up to date!");
            } else {
                print!("{plan}");
            }
        }

        Commands::Apply { yes, test } => {
            let interactive = !yes && !test;
            apply(db, &plan, interactive, !test).await?;
            if !interactive && !plan.is_empty() {
                if test {
                    info!(steps = plan.len(), "Validated plan, changes rolled back");
                } else {
                    info!(steps = plan.len(), "Applied plan");
                }
            }
        }
    }

    Ok(())
}
