use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::db;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = db::ping(&state.pool).await;
    Json(json!({
        "status": "healthy",
        "agent_ready": true,
        "database": if database { "ok" } else { "unavailable" },
    }))
}
