use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ChatStore;
use crate::models::{ChatQuery, SavedChat};

/// In-process store with the same filter semantics as the Postgres one.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    inner: Arc<RwLock<Vec<SavedChat>>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find(&self, query: &ChatQuery) -> Result<Vec<SavedChat>> {
        let guard = self.inner.read().await;
        Ok(guard.iter().filter(|chat| query.matches(chat)).cloned().collect())
    }

    async fn insert(&self, chat: &SavedChat) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.iter().any(|existing| existing.chat_id == chat.chat_id) {
            bail!("duplicate chat id {}", chat.chat_id);
        }
        guard.push(chat.clone());
        Ok(())
    }

    async fn get(&self, chat_id: &str) -> Result<Option<SavedChat>> {
        let guard = self.inner.read().await;
        Ok(guard.iter().find(|chat| chat.chat_id == chat_id).cloned())
    }

    async fn delete(&self, chat_id: &str) -> Result<bool> {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|chat| chat.chat_id != chat_id);
        Ok(guard.len() < before)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
