//! VectorIndex trait: the similarity index behind country-scoped knowledge
//! lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A reference passage about one country's law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub country: String,
    pub text: String,
    /// Where the passage came from (statute name, URL, ...). May be empty.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert(&self, passage: Passage, embedding: Vec<f32>) -> Result<(), ApiError>;

    /// Nearest neighbours among passages for `country`, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        country: &str,
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, ApiError>;

    async fn count(&self, country: Option<&str>) -> Result<usize, ApiError>;
}
