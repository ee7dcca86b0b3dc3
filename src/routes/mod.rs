//! API Routes
//!
//! - `POST /api/getSavedChats` - List saved chats matching a filter
//! - `POST /api/addSavedChat` - Save a chat, issuing upload URLs for new images
//! - `POST /api/deleteSavedChat` - Delete a chat owned by the caller
//! - `GET /api/health` - Health check

pub mod health;
pub mod saved_chats;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(saved_chats::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}
