use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use tracing::warn;

use super::{ping_pool, ChatStore};
use crate::models::{ChatMessage, ChatQuery, FeedbackFilter, SavedChat};

const COLUMNS: &str = "chat_id, chat_title, dandiset_id, dandiset_version, nwb_file_url, \
    feedback_response, feedback_notes, feedback_only, user_id, messages, timestamp_created";

// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)
#[derive(Debug, sqlx::FromRow)]
struct SavedChatRow {
    chat_id: String,
    chat_title: String,
    dandiset_id: String,
    dandiset_version: Option<String>,
    nwb_file_url: Option<String>,
    feedback_response: Option<String>,
    feedback_notes: Option<String>,
    feedback_only: Option<bool>,
    user_id: Option<String>,
    messages: serde_json::Value,
    timestamp_created: i64,
}

impl TryFrom<SavedChatRow> for SavedChat {
    type Error = anyhow::Error;

    fn try_from(row: SavedChatRow) -> Result<Self> {
        let messages: Vec<ChatMessage> = serde_json::from_value(row.messages).map_err(|e| {
            warn!(chat_id = %row.chat_id, error = %e, "Stored messages do not decode");
            anyhow!("Invalid saved chat found in database")
        })?;

        Ok(SavedChat {
            chat_id: row.chat_id,
            chat_title: row.chat_title,
            dandiset_id: row.dandiset_id,
            dandiset_version: row.dandiset_version,
            nwb_file_url: row.nwb_file_url,
            feedback_response: row.feedback_response,
            feedback_notes: row.feedback_notes,
            feedback_only: row.feedback_only,
            user_id: row.user_id,
            messages,
            timestamp_created: row.timestamp_created,
        })
    }
}

/// Postgres-backed store; messages live in a JSONB column.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_eq<'a>(builder: &mut QueryBuilder<'a, Postgres>, column: &str, value: &Option<String>) {
    if let Some(value) = value {
        builder
            .push(" AND ")
            .push(column)
            .push(" = ")
            .push_bind(value.clone());
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find(&self, query: &ChatQuery) -> Result<Vec<SavedChat>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM saved_chats WHERE TRUE", COLUMNS));

        push_eq(&mut builder, "chat_id", &query.chat_id);
        push_eq(&mut builder, "user_id", &query.user_id);
        push_eq(&mut builder, "dandiset_id", &query.dandiset_id);
        push_eq(&mut builder, "dandiset_version", &query.dandiset_version);
        push_eq(&mut builder, "nwb_file_url", &query.nwb_file_url);

        match query.feedback {
            FeedbackFilter::Only => {
                builder.push(" AND feedback_only IS TRUE");
            }
            FeedbackFilter::Exclude => {
                builder.push(" AND feedback_only IS NOT TRUE");
            }
            FeedbackFilter::Any => {}
        }
        builder.push(" ORDER BY timestamp_created ASC");

        let rows: Vec<SavedChatRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(SavedChat::try_from).collect()
    }

    async fn insert(&self, chat: &SavedChat) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO saved_chats ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            COLUMNS
        ))
        .bind(&chat.chat_id)
        .bind(&chat.chat_title)
        .bind(&chat.dandiset_id)
        .bind(&chat.dandiset_version)
        .bind(&chat.nwb_file_url)
        .bind(&chat.feedback_response)
        .bind(&chat.feedback_notes)
        .bind(chat.feedback_only)
        .bind(&chat.user_id)
        .bind(Json(&chat.messages))
        .bind(chat.timestamp_created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, chat_id: &str) -> Result<Option<SavedChat>> {
        let row: Option<SavedChatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM saved_chats WHERE chat_id = $1",
            COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SavedChat::try_from).transpose()
    }

    async fn delete(&self, chat_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_chats WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        ping_pool(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(messages: serde_json::Value) -> SavedChatRow {
        SavedChatRow {
            chat_id: "nc-1".to_string(),
            chat_title: "Title".to_string(),
            dandiset_id: "000409".to_string(),
            dandiset_version: None,
            nwb_file_url: None,
            feedback_response: None,
            feedback_notes: None,
            feedback_only: Some(false),
            user_id: Some("github|alice".to_string()),
            messages,
            timestamp_created: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_row_conversion() {
        let chat = SavedChat::try_from(row(serde_json::json!([
            {"role": "user", "content": "hello"}
        ])))
        .unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].text_content(), Some("hello"));
        assert_eq!(chat.feedback_only, Some(false));
    }

    #[test]
    fn test_invalid_messages_are_rejected() {
        let err = SavedChat::try_from(row(serde_json::json!({"not": "a list"}))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid saved chat found in database");
    }
}
