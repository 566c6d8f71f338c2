use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_admin_key;
use crate::rag::Passage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub country: String,
    pub text: String,
    pub source: Option<String>,
}

/// Embeds one passage and stores it in the country-scoped index.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_key(&headers, state.settings.server.admin_api_key.as_deref())?;

    let country = payload.country.trim();
    let text = payload.text.trim();
    if country.is_empty() || text.is_empty() {
        return Err(ApiError::BadRequest(
            "Country and text are required".to_string(),
        ));
    }

    let embedding = state
        .model
        .embed(text)
        .await
        .map_err(ApiError::agent_unavailable)?;

    let passage = Passage {
        id: uuid::Uuid::new_v4().to_string(),
        country: country.to_string(),
        text: text.to_string(),
        source: payload.source.unwrap_or_default(),
    };
    let id = passage.id.clone();
    state.index.insert(passage, embedding).await?;
    let total = state.index.count(Some(country)).await?;

    tracing::info!("Stored knowledge passage {} for {}", id, country);
    Ok(Json(json!({
        "success": true,
        "id": id,
        "country": country,
        "passages": total,
    })))
}
