use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{optional_str, required_str, Source, Tool, ToolError, ToolOutput};
use crate::llm::ChatModel;
use crate::rag::VectorIndex;

/// `search_country_context`: embeds the query with the hosted model and
/// returns the nearest stored passages for one country.
pub struct KnowledgeLookupTool {
    model: Arc<dyn ChatModel>,
    index: Arc<dyn VectorIndex>,
    limit: usize,
}

impl KnowledgeLookupTool {
    pub fn new(model: Arc<dyn ChatModel>, index: Arc<dyn VectorIndex>, limit: usize) -> Self {
        Self {
            model,
            index,
            limit,
        }
    }
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn name(&self) -> &str {
        "search_country_context"
    }

    fn description(&self) -> &str {
        "Search country-specific legal context and established laws from knowledge base"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Context search query" },
                "country": { "type": "string", "description": "Target country" }
            },
            "required": ["query", "country"]
        })
    }

    fn action(&self) -> &str {
        "vector_search"
    }

    fn describe(&self, args: &Value) -> String {
        format!(
            "Searching vector store for '{}' in {}",
            optional_str(args, "query").unwrap_or(""),
            optional_str(args, "country").unwrap_or("unknown")
        )
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(args, "query")?;
        let country = required_str(args, "country")?;

        let embedding = self
            .model
            .embed(query)
            .await
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        let hits = self
            .index
            .search(&embedding, country, self.limit)
            .await
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;

        let payload: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "country": hit.passage.country,
                    "text": hit.passage.text,
                    "score": hit.score,
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;

        let sources = hits
            .into_iter()
            .map(|hit| Source {
                title: if hit.passage.source.is_empty() {
                    format!("{} knowledge base", hit.passage.country)
                } else {
                    hit.passage.source.clone()
                },
                url: None,
                snippet: hit.passage.text,
                source_type: "knowledge_base".to_string(),
                score: Some(hit.score),
            })
            .collect();

        Ok(ToolOutput { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use crate::llm::{ChatCompletion, ChatRequest, LlmError};
    use crate::rag::{Passage, ScoredPassage};
    use std::sync::Mutex;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl ChatModel for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, LlmError> {
            Ok(ChatCompletion::default())
        }
        async fn embed(&self, _input: &str) -> Result<Vec<f32>, LlmError> {
            if self.fail {
                Err(LlmError::Transport("connection refused".to_string()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn insert(&self, _passage: Passage, _embedding: Vec<f32>) -> Result<(), ApiError> {
            Ok(())
        }
        async fn search(
            &self,
            _query_embedding: &[f32],
            country: &str,
            limit: usize,
        ) -> Result<Vec<ScoredPassage>, ApiError> {
            self.calls.lock().unwrap().push((country.to_string(), limit));
            Ok(vec![ScoredPassage {
                passage: Passage {
                    id: "p1".to_string(),
                    country: country.to_string(),
                    text: "Deposits must be returned within 30 days.".to_string(),
                    source: String::new(),
                },
                score: 0.87,
            }])
        }
        async fn count(&self, _country: Option<&str>) -> Result<usize, ApiError> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn lookup_embeds_query_and_scopes_by_country() {
        let index = Arc::new(RecordingIndex::default());
        let tool = KnowledgeLookupTool::new(Arc::new(FixedEmbedder { fail: false }), index.clone(), 2);

        let output = tool
            .invoke(&json!({ "query": "deposit refund", "country": "Kenya" }))
            .await
            .unwrap();

        assert_eq!(index.calls.lock().unwrap()[0], ("Kenya".to_string(), 2));
        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.sources[0].source_type, "knowledge_base");
        assert_eq!(output.sources[0].title, "Kenya knowledge base");
        assert_eq!(output.sources[0].score, Some(0.87));
        assert!(output.text.contains("30 days"));
    }

    #[tokio::test]
    async fn embedding_failure_is_unavailable_and_country_is_required() {
        let tool = KnowledgeLookupTool::new(
            Arc::new(FixedEmbedder { fail: true }),
            Arc::new(RecordingIndex::default()),
            2,
        );

        let err = tool
            .invoke(&json!({ "query": "q", "country": "Kenya" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));

        let err = tool.invoke(&json!({ "query": "q" })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
