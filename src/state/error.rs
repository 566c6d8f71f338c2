use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Missing required configuration: {0}")]
    MissingSecrets(String),

    #[error("Failed to open database: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Failed to initialize history store: {0}")]
    History(#[source] anyhow::Error),

    #[error("Failed to initialize auth store: {0}")]
    Auth(#[source] anyhow::Error),

    #[error("Failed to initialize knowledge index: {0}")]
    Knowledge(#[source] anyhow::Error),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize retrieval tools: {0}")]
    Tools(#[source] anyhow::Error),
}
