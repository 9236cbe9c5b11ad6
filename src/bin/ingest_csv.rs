//! Load the team productivity CSV export into the tasks table

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pulsevo_tasks::config::{init_tracing, DatabaseSettings};
use pulsevo_tasks::db;
use pulsevo_tasks::ingest::ingest_csv;

#[derive(Parser)]
#[command(name = "ingest-csv")]
#[command(about = "Upsert tasks from a CSV export")]
struct Args {
    /// Path to the CSV file to load
    #[arg(long, default_value = "team_productivity_metrics.csv")]
    csv: PathBuf,

    #[command(flatten)]
    database: DatabaseSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    if !args.csv.exists() {
        anyhow::bail!("CSV file not found: {}", args.csv.display());
    }

    let pool = db::connect(&args.database)
        .await
        .context("Failed to connect to the database")?;
    db::ensure_schema(&pool).await?;

    let count = ingest_csv(&pool, &args.csv)
        .await
        .with_context(|| format!("Failed to import {}", args.csv.display()))?;

    info!(count, "Import complete");
    println!("Imported {} tasks from {}", count, args.csv.display());
    Ok(())
}
