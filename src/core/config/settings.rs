//! Typed view over the merged configuration tree.
//!
//! Every section falls back to its defaults when missing, so an empty
//! `config.yml` is valid; only the three secrets listed in
//! [`Settings::missing_secrets`] must be supplied.

use serde::Deserialize;
use serde_json::Value;

use super::validation::validate_config;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub knowledge: KnowledgeSettings,
    pub agent: AgentSettings,
    pub extract: ExtractSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub admin_api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            max_upload_bytes: 32 * 1024 * 1024,
            admin_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.aimlapi.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    Serper,
    Brave,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub provider: SearchProvider,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: SearchProvider::Serper,
            api_key: None,
            endpoint: None,
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    pub limit: usize,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self { limit: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Upper bound on tool-calling rounds per request.
    pub max_tool_rounds: usize,
    /// How many recent user/assistant messages are replayed to the model.
    /// Must be at least 1.
    pub history_messages: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 2,
            history_messages: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub max_words: usize,
    pub max_image_bytes: usize,
    pub tesseract_path: String,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            max_words: 500,
            max_image_bytes: 10 * 1024 * 1024,
            tesseract_path: "tesseract".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_ttl_minutes: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_ttl_minutes: 10_080,
        }
    }
}

impl Settings {
    pub fn from_config(config: &Value) -> Result<Self, ApiError> {
        validate_config(config)?;
        serde_json::from_value(config.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
    }

    /// Names of the required secrets that are absent or blank.
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.llm.api_key) {
            missing.push("LLM_API_KEY");
        }
        if is_blank(&self.search.api_key) {
            missing.push("SEARCH_API_KEY");
        }
        if is_blank(&self.database.url) {
            missing.push("DATABASE_URL");
        }
        missing
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
