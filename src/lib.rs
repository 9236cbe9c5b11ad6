pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod nl_query;

pub use error::{Result, TaskError};
