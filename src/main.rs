use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use pulsevo_tasks::config::{init_tracing, AiSettings, DatabaseSettings};
use pulsevo_tasks::db;
use pulsevo_tasks::llm::LlmClient;
use pulsevo_tasks::nl_query::{PgQueryExecutor, TaskQueryAgent};

#[derive(Parser)]
#[command(name = "ask")]
#[command(about = "Answer a question about tasks with guarded SQL")]
struct Args {
    /// The question in natural language
    question: String,

    /// Print the validated SQL without running it
    #[arg(long)]
    sql_only: bool,

    #[command(flatten)]
    database: DatabaseSettings,

    #[command(flatten)]
    ai: AiSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    info!(question = %args.question, "Answering question");

    // The pool is lazy so --sql-only never opens a connection.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(args.database.db_max_connections)
        .connect_lazy(&args.database.database_url)?;

    let agent = TaskQueryAgent::new(
        args.ai.prompt_builder(),
        args.ai.guardrail(),
        Arc::new(LlmClient::from_settings(&args.ai)?),
        Arc::new(PgQueryExecutor::new(pool.clone(), args.ai.ai_row_cap)),
    );

    if args.sql_only {
        println!("{}", agent.build_sql(&args.question).await?);
        return Ok(());
    }

    db::ensure_schema(&pool).await?;
    let answer = agent.answer(&args.question).await?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
