use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use saved_chats::{
    config::Config,
    db::{create_pool, PgChatStore},
    images::ImageRewriter,
    middleware::{GitHubIdentityProvider, IdentityCache},
    routes::create_router,
    storage::S3UploadSigner,
    utils::init_tracing,
    AppState,
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        server = ?config.server,
        storage = ?config.storage,
        "Configuration loaded"
    );

    // Connect to database
    let pool = create_pool(&config.database).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    let signer = S3UploadSigner::from_config(&config.storage)?;
    let images = ImageRewriter::new(
        Arc::new(signer),
        config.storage.public_base_url.clone(),
        config.storage.key_prefix.clone(),
    );

    let provider = GitHubIdentityProvider::new(config.auth.github_api_url.clone())?;
    let identity = IdentityCache::new(
        Arc::new(provider),
        config.auth.identity_cache_ttl_secs.map(Duration::from_secs),
    );

    // Create shared state
    let state = AppState {
        store: Arc::new(PgChatStore::new(pool)),
        identity: Arc::new(identity),
        images,
        config: config.clone(),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a socket address")?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
