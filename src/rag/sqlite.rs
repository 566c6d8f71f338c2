//! SQLite-backed knowledge index.
//!
//! Passages live in the application database with their embedding stored
//! as a little-endian f32 blob; search is a brute-force cosine scan over
//! the rows of one country.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::store::{Passage, ScoredPassage, VectorIndex};
use crate::core::errors::ApiError;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS knowledge_passages (
                id TEXT PRIMARY KEY,
                country TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_country
             ON knowledge_passages(country COLLATE NOCASE)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_passage(row: &sqlx::sqlite::SqliteRow) -> Result<Passage, sqlx::Error> {
        Ok(Passage {
            id: row.try_get("id")?,
            country: row.try_get("country")?,
            text: row.try_get("text")?,
            source: row.try_get("source")?,
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert(&self, passage: Passage, embedding: Vec<f32>) -> Result<(), ApiError> {
        if embedding.is_empty() {
            return Err(ApiError::BadRequest("Embedding cannot be empty".to_string()));
        }
        let blob = Self::serialize_embedding(&embedding);

        sqlx::query(
            "INSERT OR REPLACE INTO knowledge_passages (id, country, text, source, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&passage.id)
        .bind(passage.country.trim())
        .bind(&passage.text)
        .bind(&passage.source)
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        country: &str,
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, country, text, source, embedding
             FROM knowledge_passages
             WHERE country = ?1 COLLATE NOCASE",
        )
        .bind(country.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.try_get("embedding")?;
            let stored = Self::deserialize_embedding(&embedding_bytes);
            scored.push(ScoredPassage {
                passage: Self::row_to_passage(row)?,
                score: Self::cosine_similarity(query_embedding, &stored),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    async fn count(&self, country: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(country) = country {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM knowledge_passages WHERE country = ?1 COLLATE NOCASE",
            )
            .bind(country.trim())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_passages")
                .fetch_one(&self.pool)
                .await?
        };

        Ok(count as usize)
    }
}
