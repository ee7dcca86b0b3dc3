use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::models::{ChatQuery, SavedChat};

pub use memory::*;
pub use operations::*;

pub mod memory;
pub mod operations;

/// Document-store contract for saved chats.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find(&self, query: &ChatQuery) -> Result<Vec<SavedChat>>;
    async fn insert(&self, chat: &SavedChat) -> Result<()>;
    async fn get(&self, chat_id: &str) -> Result<Option<SavedChat>>;
    /// Returns whether a record was removed.
    async fn delete(&self, chat_id: &str) -> Result<bool>;
    async fn ping(&self) -> Result<()>;
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(&config.url)
        .await?;

    ping_pool(&pool).await?;
    info!(max_connections = config.max_connections, "Database pool ready");

    Ok(pool)
}

/// Round-trip a trivial query to prove the pool can reach the server.
pub async fn ping_pool(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
