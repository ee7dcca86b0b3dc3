use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::ChatStore;
use crate::images::{ImageRewriter, ImageSubstitution};
use crate::middleware::IdentityCache;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub identity: Arc<IdentityCache>,
    pub images: ImageRewriter,
    pub config: Config,
}

/// One chat turn, kept as the exact JSON object the client sent. Only a string
/// `content` is ever interpreted or replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("role".to_string(), serde_json::Value::String(role.into()));
        fields.insert("content".to_string(), serde_json::Value::String(content.into()));
        Self { fields }
    }

    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.fields
    }

    /// `content` when it is a plain string; null, arrays and objects yield `None`.
    pub fn text_content(&self) -> Option<&str> {
        self.fields.get("content")?.as_str()
    }

    /// Copy of this message with its string `content` replaced.
    pub fn with_text_content(&self, text: String) -> Self {
        let mut fields = self.fields.clone();
        fields.insert("content".to_string(), serde_json::Value::String(text));
        Self { fields }
    }
}

/// A persisted chat transcript. Optional fields are omitted from the stored
/// document when absent or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedChat {
    pub chat_id: String,
    pub chat_title: String,
    pub dandiset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dandiset_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwb_file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub timestamp_created: i64,
}

impl SavedChat {
    pub fn is_feedback_only(&self) -> bool {
        self.feedback_only == Some(true)
    }
}

/// Equality filter over saved chats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatQuery {
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub dandiset_id: Option<String>,
    pub dandiset_version: Option<String>,
    pub nwb_file_url: Option<String>,
    pub feedback: FeedbackFilter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedbackFilter {
    /// `feedbackOnly` must be true.
    Only,
    /// `feedbackOnly` must be false or absent.
    #[default]
    Exclude,
    /// No constraint on `feedbackOnly`.
    Any,
}

impl ChatQuery {
    pub fn matches(&self, chat: &SavedChat) -> bool {
        fn eq(want: &Option<String>, have: Option<&str>) -> bool {
            want.as_deref().map_or(true, |w| have == Some(w))
        }

        let feedback_ok = match self.feedback {
            FeedbackFilter::Only => chat.is_feedback_only(),
            FeedbackFilter::Exclude => !chat.is_feedback_only(),
            FeedbackFilter::Any => true,
        };

        feedback_ok
            && eq(&self.chat_id, Some(chat.chat_id.as_str()))
            && eq(&self.user_id, chat.user_id.as_deref())
            && eq(&self.dandiset_id, Some(chat.dandiset_id.as_str()))
            && eq(&self.dandiset_version, chat.dandiset_version.as_deref())
            && eq(&self.nwb_file_url, chat.nwb_file_url.as_deref())
    }
}

// API Request/Response types

/// Request envelopes, discriminated by their `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ApiRequest {
    GetSavedChats(GetSavedChatsRequest),
    AddSavedChat(AddSavedChatRequest),
    DeleteSavedChat(DeleteSavedChatRequest),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSavedChatsRequest {
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub dandiset_id: Option<String>,
    pub dandiset_version: Option<String>,
    pub nwb_file_url: Option<String>,
    pub feedback: Option<bool>,
}

impl GetSavedChatsRequest {
    pub fn to_query(&self) -> ChatQuery {
        let chat_id = non_empty(self.chat_id.clone());
        let feedback = if self.feedback == Some(true) {
            FeedbackFilter::Only
        } else if chat_id.is_some() {
            // an explicit chat id may name a feedback record
            FeedbackFilter::Any
        } else {
            FeedbackFilter::Exclude
        };

        ChatQuery {
            chat_id,
            user_id: non_empty(self.user_id.clone()),
            dandiset_id: non_empty(self.dandiset_id.clone()),
            dandiset_version: non_empty(self.dandiset_version.clone()),
            nwb_file_url: non_empty(self.nwb_file_url.clone()),
            feedback,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSavedChatRequest {
    pub chat_title: String,
    pub dandiset_id: String,
    pub dandiset_version: Option<String>,
    pub nwb_file_url: Option<String>,
    pub feedback_response: Option<String>,
    pub feedback_notes: Option<String>,
    pub feedback_only: Option<bool>,
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSavedChatRequest {
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ApiResponse {
    GetSavedChats(GetSavedChatsResponse),
    AddSavedChat(AddSavedChatResponse),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSavedChatsResponse {
    pub saved_chats: Vec<SavedChat>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSavedChatResponse {
    pub chat_id: String,
    /// One entry per newly referenced image; the client uploads each to `uploadUrl`.
    pub image_uploads: Vec<ImageSubstitution>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Empty strings count as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
