//! HTTP server for the Pulsevo tasks API

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use pulsevo_tasks::config::{init_tracing, Settings};
use pulsevo_tasks::db;
use pulsevo_tasks::http::{self, AppState};
use pulsevo_tasks::llm::LlmClient;
use pulsevo_tasks::nl_query::{PgQueryExecutor, TaskQueryAgent};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();
    init_tracing();

    let pool = db::connect(&settings.database)
        .await
        .context("Failed to connect to the database")?;
    db::ensure_schema(&pool)
        .await
        .context("Failed to create the task schema")?;

    let client = LlmClient::from_settings(&settings.ai)?;
    if client.is_configured() {
        info!(model = client.model(), "Natural-language queries enabled");
    } else {
        warn!("OPENAI_API_KEY not set; /ai/query will answer 503");
    }

    let agent = TaskQueryAgent::new(
        settings.ai.prompt_builder(),
        settings.ai.guardrail(),
        Arc::new(client),
        Arc::new(PgQueryExecutor::new(pool.clone(), settings.ai.ai_row_cap)),
    );
    let state = Arc::new(AppState::new(pool, agent));

    let listener = TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "Starting tasks API");

    http::serve(listener, state).await?;
    Ok(())
}
