use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::current_user;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub chat_id: Option<String>,
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &headers).await?;
    let sessions = state.history.list_sessions(&user.id).await?;
    let chats: Vec<Value> = sessions
        .into_iter()
        .map(|session| {
            json!({
                "id": session.id,
                "title": session.title,
                "created_at": session.created_at,
                "updated_at": session.updated_at,
                "message_count": session.message_count,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "chats": chats })))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &headers).await?;
    let session = state
        .history
        .find_owned_session(&user.id, &chat_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?;

    let messages = state.history.load(&session.id).await?;
    let messages: Vec<Value> = messages
        .into_iter()
        .map(|msg| {
            let metadata = msg.metadata.unwrap_or(Value::Null);
            json!({
                "id": msg.id,
                "role": msg.role.as_str(),
                "content": msg.content,
                "attachments": msg.attachments,
                "structured_response": metadata.get("structured_response").cloned().unwrap_or(Value::Null),
                "sources": metadata.get("sources").cloned().unwrap_or_else(|| json!([])),
                "timestamp": msg.created_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "chat": {
            "id": session.id,
            "title": session.title,
            "messages": messages,
        }
    })))
}

/// Clears one chat when `chat_id` is given, otherwise every chat of the caller.
pub async fn clear_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ClearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &headers).await?;

    let cleared = match query.chat_id.as_deref().filter(|id| !id.is_empty()) {
        Some(chat_id) => {
            let session = state
                .history
                .find_owned_session(&user.id, chat_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?;
            state.history.clear(&session.id).await?
        }
        None => state.history.clear_user(&user.id).await?,
    };

    tracing::info!("Cleared {} message(s) for user {}", cleared, user.id);
    Ok(Json(json!({
        "success": true,
        "message": "Conversation history cleared successfully",
        "cleared": cleared,
    })))
}
