use std::sync::Arc;

use sqlx::SqlitePool;

use crate::agent::Orchestrator;
use crate::auth::AuthStore;
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::db;
use crate::extract::{ContentExtractor, OcrEngine, TesseractOcr};
use crate::history::HistoryStore;
use crate::llm::{ChatModel, OpenAiCompatibleProvider};
use crate::rag::{SqliteVectorIndex, VectorIndex};
use crate::tools::{KnowledgeLookupTool, ToolRegistry, WebSearchTool};

pub mod error;

use error::InitializationError;

/// Shared application state handed to every handler.
///
/// Everything here is either immutable or backed by the database pool;
/// requests share nothing else.
pub struct AppState {
    pub settings: Settings,
    pub pool: SqlitePool,
    pub history: HistoryStore,
    pub auth: AuthStore,
    pub extractor: ContentExtractor,
    pub orchestrator: Orchestrator,
    pub model: Arc<dyn ChatModel>,
    pub index: Arc<dyn VectorIndex>,
}

impl AppState {
    /// Loads configuration, refuses to start without the required secrets,
    /// then connects the hosted model and the database.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths);
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let missing = settings.missing_secrets();
        if !missing.is_empty() {
            return Err(InitializationError::MissingSecrets(missing.join(", ")));
        }

        let api_key = settings.llm.api_key.clone().unwrap_or_default();
        let model: Arc<dyn ChatModel> = Arc::new(
            OpenAiCompatibleProvider::new(&settings.llm, api_key)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let database_url = settings.database.url.clone().unwrap_or_default();
        let pool = db::connect(&database_url)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;

        let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::new(&settings.extract.tesseract_path));

        Self::from_parts(settings, pool, model, ocr).await
    }

    /// Wires the stores, extractor and agent over an existing pool and model.
    pub async fn from_parts(
        settings: Settings,
        pool: SqlitePool,
        model: Arc<dyn ChatModel>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Result<Arc<Self>, InitializationError> {
        let history = HistoryStore::new(pool.clone())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;
        let auth = AuthStore::new(pool.clone(), settings.auth.token_ttl_minutes)
            .await
            .map_err(|e| InitializationError::Auth(e.into()))?;
        let index: Arc<dyn VectorIndex> = Arc::new(
            SqliteVectorIndex::new(pool.clone())
                .await
                .map_err(|e| InitializationError::Knowledge(e.into()))?,
        );

        let search_key = settings.search.api_key.clone().unwrap_or_default();
        let search = WebSearchTool::new(&settings.search, search_key)
            .map_err(|e| InitializationError::Tools(e.into()))?;
        let knowledge =
            KnowledgeLookupTool::new(model.clone(), index.clone(), settings.knowledge.limit);
        let tools = ToolRegistry::new()
            .with(Arc::new(search))
            .with(Arc::new(knowledge));

        tracing::info!(
            "Legal agent ready: model {}, tools [{}], max {} tool round(s)",
            settings.llm.chat_model,
            tools.names().join(", "),
            settings.agent.max_tool_rounds
        );

        let orchestrator = Orchestrator::new(
            model.clone(),
            tools,
            settings.agent.max_tool_rounds,
            settings.llm.temperature,
        );
        let extractor = ContentExtractor::new(&settings.extract, ocr);

        Ok(Arc::new(AppState {
            settings,
            pool,
            history,
            auth,
            extractor,
            orchestrator,
            model,
            index,
        }))
    }
}
