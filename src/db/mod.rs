//! Database module for PostgreSQL connection and operations
//!
//! This module provides the connection pool, schema bootstrap and the task and
//! analytics repositories

pub mod analytics;
pub mod connection;
pub mod task_repo;

pub use analytics::AnalyticsRepository;
pub use connection::{connect, ensure_schema, init_pool};
pub use task_repo::TaskRepository;
