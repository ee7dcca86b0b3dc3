//! Token-to-identity resolution.
//!
//! Handlers pull the access token out of the `Authorization` header and ask the
//! shared [`IdentityCache`] for the user id behind it. The cache only calls the
//! provider on a miss and never stores failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider rejected token: {0}")]
    Rejected(StatusCode),

    #[error("Identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid identity response: {0}")]
    InvalidResponse(String),
}

/// Maps an OAuth access token to a stable user id such as `github|octocat`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_id_for_token(&self, token: &str) -> Result<String, IdentityError>;
}

/// Token from an `Authorization: <scheme> <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .split(' ')
        .nth(1)
        .filter(|token| !token.is_empty())
}

struct CachedIdentity {
    user_id: String,
    cached_at: Instant,
}

/// Get-or-populate cache in front of an [`IdentityProvider`].
///
/// Without a TTL entries live as long as the process.
pub struct IdentityCache {
    provider: Arc<dyn IdentityProvider>,
    ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CachedIdentity>>,
}

impl IdentityCache {
    pub fn new(provider: Arc<dyn IdentityProvider>, ttl: Option<Duration>) -> Self {
        Self {
            provider,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn user_id_for_token(&self, token: &str) -> Result<String, IdentityError> {
        if let Some(user_id) = self.lookup(token).await {
            return Ok(user_id);
        }

        let user_id = self.provider.user_id_for_token(token).await?;
        debug!(user_id = %user_id, "Resolved access token");

        let mut guard = self.entries.write().await;
        guard.insert(
            token.to_string(),
            CachedIdentity {
                user_id: user_id.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(user_id)
    }

    async fn lookup(&self, token: &str) -> Option<String> {
        let guard = self.entries.read().await;
        let entry = guard.get(token)?;
        match self.ttl {
            Some(ttl) if entry.cached_at.elapsed() >= ttl => None,
            _ => Some(entry.user_id.clone()),
        }
    }
}
