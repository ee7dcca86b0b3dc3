use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Bucket descriptor for chat images. Uploads are signed against `bucket`,
/// downloads are served from `public_base_url`.
#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub public_base_url: String,
    pub key_prefix: String,
    pub upload_url_ttl_secs: u32,
}

// Keeps the secret out of startup logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("public_base_url", &self.public_base_url)
            .field("key_prefix", &self.key_prefix)
            .field("upload_url_ttl_secs", &self.upload_url_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub github_api_url: String,
    pub feedback_admin_user_id: String,
    pub identity_cache_ttl_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .context("PORT must be a port number")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            storage: StorageConfig {
                bucket: env::var("IMAGE_BUCKET").context("IMAGE_BUCKET must be set")?,
                region: env::var("IMAGE_BUCKET_REGION").unwrap_or_else(|_| "auto".to_string()),
                endpoint: env::var("IMAGE_BUCKET_ENDPOINT").ok(),
                access_key_id: env::var("IMAGE_BUCKET_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("IMAGE_BUCKET_SECRET_ACCESS_KEY").ok(),
                public_base_url: env::var("IMAGE_PUBLIC_BASE_URL")
                    .context("IMAGE_PUBLIC_BASE_URL must be set")?
                    .trim_end_matches('/')
                    .to_string(),
                key_prefix: env::var("IMAGE_KEY_PREFIX")
                    .unwrap_or_else(|_| "saved-chats".to_string())
                    .trim_matches('/')
                    .to_string(),
                upload_url_ttl_secs: env::var("IMAGE_UPLOAD_URL_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                github_api_url: env::var("GITHUB_API_URL")
                    .unwrap_or_else(|_| "https://api.github.com".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                feedback_admin_user_id: env::var("FEEDBACK_ADMIN_USER_ID")
                    .unwrap_or_else(|_| "github|magland".to_string()),
                identity_cache_ttl_secs: match env::var("IDENTITY_CACHE_TTL_SECS") {
                    Ok(value) => Some(value.parse().context("IDENTITY_CACHE_TTL_SECS must be an integer")?),
                    Err(_) => None,
                },
            },
        })
    }
}
