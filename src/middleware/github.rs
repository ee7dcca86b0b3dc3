// GitHub as identity provider: `GET /user` with the caller's access token

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use super::auth::{IdentityError, IdentityProvider};

const USER_AGENT: &str = concat!("saved-chats/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

pub struct GitHubIdentityProvider {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubIdentityProvider {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GitHubIdentityProvider {
    async fn user_id_for_token(&self, token: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .get(format!("{}/user", self.api_url))
            .header(AUTHORIZATION, format!("token {}", token))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status()));
        }

        let user: GitHubUser = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;

        Ok(format!("github|{}", user.login))
    }
}
