use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::User;
use crate::core::errors::ApiError;
use crate::core::security::bearer_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .auth
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    let token = state.auth.issue_token(&user.id).await?;
    Ok(Json(json!({ "success": true, "token": token, "user": user })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state.auth.login(&payload.email, &payload.password).await?;
    tracing::info!("User {} logged in", user.id);
    Ok(Json(json!({ "success": true, "token": token, "user": user })))
}

/// Resolves the `Authorization: Bearer` header to a user.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    state.auth.authenticate(token).await
}
