use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::current_user;
use crate::agent::{TurnAttachment, UserTurn};
use crate::auth::User;
use crate::core::errors::ApiError;
use crate::extract::AttachmentKind;
use crate::history::NewMessage;
use crate::llm::Role;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TextChatRequest {
    pub message: String,
    pub context: Option<String>,
    pub chat_id: Option<String>,
}

struct Upload {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Default)]
struct ChatForm {
    message: Option<String>,
    context: Option<String>,
    chat_id: Option<String>,
    document: Option<Upload>,
    image: Option<Upload>,
}

/// `POST /chat`: multipart question with optional document, image and context.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &headers).await?;
    let form = read_form(multipart).await?;

    let mut turn = UserTurn::new(
        form.message.as_deref().unwrap_or_default(),
        form.context.as_deref(),
    )?;
    if let Some(upload) = form.document {
        turn.document = Some(extract_attachment(&state, AttachmentKind::Document, upload).await?);
    }
    if let Some(upload) = form.image {
        turn.image = Some(extract_attachment(&state, AttachmentKind::Image, upload).await?);
    }

    let body = run_turn(&state, &user, turn, form.chat_id.as_deref()).await?;
    Ok(Json(body))
}

/// `POST /chat/text`: JSON question with optional context.
pub async fn chat_text(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<TextChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, &headers).await?;
    let turn = UserTurn::new(&payload.message, payload.context.as_deref())?;
    let body = run_turn(&state, &user, turn, payload.chat_id.as_deref()).await?;
    Ok(Json(body))
}

async fn read_form(mut multipart: Multipart) -> Result<ChatForm, ApiError> {
    let mut form = ChatForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "message" => form.message = Some(field.text().await.map_err(invalid_form)?),
            "context" => form.context = Some(field.text().await.map_err(invalid_form)?),
            "chat_id" => form.chat_id = Some(field.text().await.map_err(invalid_form)?),
            "document" | "image" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_form)?;
                // Browsers send an empty, unnamed part for an untouched file input.
                if bytes.is_empty() && filename.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                let upload = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
                if name == "document" {
                    form.document = upload;
                } else {
                    form.image = upload;
                }
            }
            other => tracing::debug!("Ignoring unknown form field {}", other),
        }
    }
    Ok(form)
}

fn invalid_form(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid form data: {}", err))
}

async fn extract_attachment(
    state: &AppState,
    kind: AttachmentKind,
    upload: Upload,
) -> Result<TurnAttachment, ApiError> {
    let (format, extracted) = state
        .extractor
        .extract_upload(
            kind,
            upload.filename.as_deref(),
            upload.content_type.as_deref(),
            &upload.bytes,
        )
        .await?;
    Ok(TurnAttachment {
        kind,
        format,
        filename: upload.filename,
        extracted,
    })
}

/// Shared by both chat endpoints once the turn is assembled. Nothing is
/// persisted unless the orchestrator answers, so a failed turn leaves no
/// session or dangling question behind.
async fn run_turn(
    state: &AppState,
    user: &User,
    turn: UserTurn,
    chat_id: Option<&str>,
) -> Result<Value, ApiError> {
    let word_count = turn.check_budget(state.extractor.max_words())?;

    let existing = match chat_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => Some(
            state
                .history
                .find_owned_session(&user.id, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?
                .id,
        ),
        None => None,
    };

    let history = match &existing {
        Some(id) => {
            state
                .history
                .load_recent(id, state.settings.agent.history_messages)
                .await?
        }
        None => Vec::new(),
    };

    let prompt = turn.prompt();
    tracing::info!(
        "Chat {}: {} history message(s), {} context word(s)",
        existing.as_deref().unwrap_or("(new)"),
        history.len(),
        word_count
    );
    let reply = state.orchestrator.run(&history, &prompt).await?;

    let session_id = match existing {
        Some(id) => id,
        None => {
            state
                .history
                .create_session(Some(&user.id), &turn.title())
                .await?
        }
    };
    if reply.degraded() {
        tracing::warn!(
            "Chat {} answered without some retrieval: {}",
            session_id,
            reply.tool_errors.join("; ")
        );
    }

    let user_message = NewMessage::new(Role::User, turn.message.clone())
        .with_attachments(turn.attachment_meta())
        .with_metadata(json!({ "prompt": prompt, "context": turn.context }));
    let assistant_message =
        NewMessage::new(Role::Assistant, reply.text.clone()).with_metadata(reply.metadata());
    state
        .history
        .append_turn(&session_id, vec![user_message, assistant_message])
        .await?;

    let mut context_used = turn.context_labels();
    for action in reply.tools_used() {
        if !context_used.contains(&action) {
            context_used.push(action);
        }
    }

    Ok(json!({
        "success": true,
        "response": reply.text,
        "structured_response": reply.structured,
        "sources": reply.sources,
        "context_used": context_used,
        "word_count": if word_count > 0 { Some(word_count) } else { None },
        "document_text": turn.document.as_ref().map(|d| d.extracted.text.clone()),
        "image_text": turn.image.as_ref().map(|i| i.extracted.text.clone()),
        "prompt": prompt,
        "agent_actions": reply.actions,
        "tool_errors": reply.tool_errors,
        "degraded": reply.degraded(),
        "tool_rounds": reply.tool_rounds,
        "chat_id": session_id,
    }))
}
