// Saved Chats - persistence service for chat transcripts and their images

pub mod config;
pub mod db;
pub mod images;     // Image placeholder rewriting and URL collection
pub mod middleware; // Access token resolution
pub mod models;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
