//! Settings loaded once at startup from flags, the environment and `.env`.

use std::net::SocketAddr;

use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;

use crate::nl_query::{PromptBuilder, SqlGuardrail};

#[derive(Debug, Clone, Args)]
pub struct DatabaseSettings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,
}

#[derive(Debug, Clone, Args)]
pub struct AiSettings {
    /// API key for the generation service; natural-language queries answer
    /// 503 without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    pub openai_timeout_secs: u64,

    /// Maximum rows returned for a generated query (0 disables the cap)
    #[arg(long, env = "AI_ROW_CAP", default_value_t = 100)]
    pub ai_row_cap: u32,

    /// Also require a parsed single-table statement shape
    #[arg(long, env = "AI_STRICT_SQL")]
    pub ai_strict_sql: bool,
}

impl AiSettings {
    pub fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(self.ai_row_cap)
    }

    pub fn guardrail(&self) -> SqlGuardrail {
        SqlGuardrail::with_strict_shape(self.ai_strict_sql)
    }
}

/// Settings for the API server.
#[derive(Debug, Clone, Parser)]
#[command(name = "server")]
#[command(about = "Tasks API backing the Pulsevo dashboard")]
pub struct Settings {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: SocketAddr,

    #[command(flatten)]
    pub database: DatabaseSettings,

    #[command(flatten)]
    pub ai: AiSettings,
}

impl Settings {
    /// Read `.env` (if present) and parse flags and environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }
}

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
