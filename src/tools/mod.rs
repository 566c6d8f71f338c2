//! Retrieval tools the model may call.
//!
//! Each tool is a trait object with a name, a JSON-schema input and one
//! async `invoke`. The registry advertises them to the model and routes
//! calls by name.

pub mod knowledge;
pub mod search;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolSpec;

pub use knowledge::KnowledgeLookupTool;
pub use search::WebSearchTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("retrieval unavailable: {0}")]
    Unavailable(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// A reference backing part of an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub snippet: String,
    /// `official`, `legal` or `knowledge_base`.
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Payload handed back to the model as the tool message.
    pub text: String,
    pub sources: Vec<Source>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Short label recorded in agent actions, e.g. `web_search`.
    fn action(&self) -> &str;

    /// Human-readable summary of one call.
    fn describe(&self, args: &Value) -> String;

    async fn invoke(&self, args: &Value) -> Result<ToolOutput, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool registered under an existing name replaces it.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' is required", key)))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        fn action(&self) -> &str {
            "test"
        }
        fn describe(&self, _args: &Value) -> String {
            String::new()
        }
        async fn invoke(&self, _args: &Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput {
                text: self.1.to_string(),
                sources: Vec::new(),
            })
        }
    }

    #[test]
    fn registry_routes_by_name_and_replaces_duplicates() {
        let registry = ToolRegistry::new()
            .with(Arc::new(Named("a", "first")))
            .with(Arc::new(Named("b", "second")))
            .with(Arc::new(Named("a", "replaced")));

        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.get("a").unwrap().description(), "replaced");
        assert!(registry.get("missing").is_none());

        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name, "a");
    }

    #[test]
    fn argument_helpers_trim_and_require() {
        let args = json!({ "query": "  deposit  ", "country": "", "n": 3 });
        assert_eq!(required_str(&args, "query").unwrap(), "deposit");
        assert!(required_str(&args, "country").is_err());
        assert!(required_str(&args, "n").is_err());
        assert_eq!(optional_str(&args, "country"), None);
    }
}
