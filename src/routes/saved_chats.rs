//! Saved chat endpoints.
//!
//! Request bodies are tagged JSON envelopes (`{"type": "AddSavedChat", ...}`);
//! anything that does not parse into the envelope an endpoint expects is a 400.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::images::collect_image_urls;
use crate::middleware::bearer_token;
use crate::models::{
    non_empty, AddSavedChatResponse, ApiRequest, ApiResponse, AppState, GetSavedChatsResponse,
    SavedChat,
};
use crate::types::{AppError, AppResult};
use crate::utils::random_alphanumeric;

const CHAT_ID_PREFIX: &str = "nc-";
const CHAT_ID_LEN: usize = 14;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/getSavedChats", post(get_saved_chats))
        .route("/api/addSavedChat", post(add_saved_chat))
        .route("/api/deleteSavedChat", post(delete_saved_chat))
        .with_state(state)
}

fn parse_request(body: &[u8]) -> AppResult<ApiRequest> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        AppError::InvalidRequest
    })
}

async fn get_saved_chats(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ApiResponse>> {
    let ApiRequest::GetSavedChats(request) = parse_request(&body)? else {
        return Err(AppError::InvalidRequest);
    };

    let query = request.to_query();
    let saved_chats = state.store.find(&query).await?;
    info!(count = saved_chats.len(), feedback = ?query.feedback, "Listed saved chats");

    Ok(Json(ApiResponse::GetSavedChats(GetSavedChatsResponse {
        saved_chats,
    })))
}

async fn add_saved_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse>> {
    let ApiRequest::AddSavedChat(request) = parse_request(&body)? else {
        return Err(AppError::InvalidRequest);
    };

    // Feedback may be submitted anonymously; everything else needs a token.
    let user_id = match bearer_token(&headers) {
        Some(token) => Some(state.identity.user_id_for_token(token).await.map_err(|e| {
            warn!(error = %e, "Identity lookup failed");
            AppError::unauthorized("Failed to get user id")
        })?),
        None if request.feedback_only == Some(true) => None,
        None => return Err(AppError::unauthorized("Unauthorized")),
    };

    if let Some(claimed) = non_empty(request.user_id.clone()) {
        if user_id.as_deref() != Some(claimed.as_str()) {
            return Err(AppError::unauthorized("Unauthorized (wrong user)"));
        }
    }

    // Nothing is persisted unless every placeholder resolves.
    let rewritten = state.images.rewrite_all(&request.messages).await?;

    let chat_id = format!("{}{}", CHAT_ID_PREFIX, random_alphanumeric(CHAT_ID_LEN));
    let chat = SavedChat {
        chat_id: chat_id.clone(),
        chat_title: request.chat_title,
        dandiset_id: request.dandiset_id,
        dandiset_version: non_empty(request.dandiset_version),
        nwb_file_url: non_empty(request.nwb_file_url),
        feedback_response: non_empty(request.feedback_response),
        feedback_notes: non_empty(request.feedback_notes),
        feedback_only: request.feedback_only,
        user_id,
        messages: rewritten.messages,
        timestamp_created: Utc::now().timestamp_millis(),
    };
    state.store.insert(&chat).await?;

    info!(
        chat_id = %chat_id,
        user_id = ?chat.user_id,
        images = rewritten.substitutions.len(),
        "Saved chat"
    );

    Ok(Json(ApiResponse::AddSavedChat(AddSavedChatResponse {
        chat_id,
        image_uploads: rewritten.substitutions,
    })))
}

async fn delete_saved_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let ApiRequest::DeleteSavedChat(request) = parse_request(&body)? else {
        return Err(AppError::InvalidRequest);
    };

    let token = bearer_token(&headers).ok_or_else(|| AppError::unauthorized("Unauthorized"))?;
    let user_id = state.identity.user_id_for_token(token).await.map_err(|e| {
        warn!(error = %e, "Identity lookup failed");
        AppError::unauthorized("Unauthorized")
    })?;

    let not_found = || AppError::NotFound("Saved chat not found".to_string());
    let existing = state.store.get(&request.chat_id).await?.ok_or_else(not_found)?;

    if existing.is_feedback_only() {
        if user_id != state.config.auth.feedback_admin_user_id {
            return Err(AppError::unauthorized("Unauthorized"));
        }
    } else if existing.user_id.as_deref() != Some(user_id.as_str()) {
        return Err(AppError::unauthorized("Unauthorized: wrong user"));
    }

    if !state.store.delete(&request.chat_id).await? {
        return Err(not_found());
    }

    // Backing objects are left to the bucket's lifecycle rules.
    let image_urls = collect_image_urls(&existing.messages);
    info!(
        chat_id = %request.chat_id,
        user_id = %user_id,
        images = ?image_urls,
        "Deleted saved chat"
    );

    Ok(Json(serde_json::json!({})))
}
