use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use super::{optional_str, required_str, Source, Tool, ToolError, ToolOutput};
use crate::core::config::settings::{SearchProvider, SearchSettings};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Host fragments that mark a result as a legal or official source.
const LEGAL_DOMAINS: [&str; 5] = [".gov", "legislature", "courts", "attorney", "legal"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// `search_recent_laws`: web search biased toward recent legislation.
pub struct WebSearchTool {
    provider: SearchProvider,
    api_key: String,
    endpoint: String,
    max_results: usize,
    client: Client,
}

impl WebSearchTool {
    pub fn new(settings: &SearchSettings, api_key: String) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        let endpoint = settings.endpoint.clone().unwrap_or_else(|| {
            match settings.provider {
                SearchProvider::Serper => SERPER_ENDPOINT,
                SearchProvider::Brave => BRAVE_ENDPOINT,
            }
            .to_string()
        });
        Ok(Self {
            provider: settings.provider,
            api_key,
            endpoint,
            max_results: settings.max_results,
            client,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let mut results = match self.provider {
            SearchProvider::Serper => self.serper_search(query).await?,
            SearchProvider::Brave => self.brave_search(query).await?,
        };
        results.truncate(self.max_results);
        Ok(results)
    }

    async fn serper_search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": self.max_results }))
            .send()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Serper search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Unavailable(format!(
                "Serper search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Serper search failed: {}", e)))?;
        Ok(parse_serper(&payload))
    }

    async fn brave_search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let url = format!(
            "{}?q={}&count={}",
            self.endpoint,
            urlencoding::encode(query),
            self.max_results
        );

        let response = self
            .client
            .get(url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Brave search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Unavailable(format!(
                "Brave search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Brave search failed: {}", e)))?;
        Ok(parse_brave(&payload))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search_recent_laws"
    }

    fn description(&self) -> &str {
        "Search for recent legal updates, new laws, and policy changes"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Legal search query" },
                "jurisdiction": { "type": "string", "description": "Country or jurisdiction (optional)" }
            },
            "required": ["query"]
        })
    }

    fn action(&self) -> &str {
        "web_search"
    }

    fn describe(&self, args: &Value) -> String {
        format!(
            "Searching web for '{}' in {}",
            optional_str(args, "query").unwrap_or(""),
            optional_str(args, "jurisdiction").unwrap_or("global")
        )
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(args, "query")?;
        let jurisdiction = optional_str(args, "jurisdiction");
        let legal_query = legal_query(query, jurisdiction, chrono::Utc::now().year());

        let results = self.search(&legal_query).await?;
        let sources = filter_legal_sources(results);
        tracing::debug!("Web search for '{}' kept {} sources", legal_query, sources.len());

        let text = serde_json::to_string_pretty(&sources)
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        Ok(ToolOutput { text, sources })
    }
}

pub fn legal_query(query: &str, jurisdiction: Option<&str>, year: i32) -> String {
    let mut legal_query = format!("{} law statute regulation {} {}", query, year - 1, year);
    if let Some(jurisdiction) = jurisdiction {
        legal_query.push(' ');
        legal_query.push_str(jurisdiction);
    }
    legal_query
}

/// Keeps results from legal or official hosts, preserving rank order.
pub fn filter_legal_sources(results: Vec<SearchResult>) -> Vec<Source> {
    results
        .into_iter()
        .filter(|r| LEGAL_DOMAINS.iter().any(|d| r.url.contains(d)))
        .map(|r| {
            let source_type = if r.url.contains(".gov") {
                "official"
            } else {
                "legal"
            };
            Source {
                title: r.title,
                url: Some(r.url),
                snippet: r.snippet,
                source_type: source_type.to_string(),
                score: None,
            }
        })
        .collect()
}

fn parse_serper(payload: &Value) -> Vec<SearchResult> {
    collect_results(payload.get("organic"), "title", "link", "snippet")
}

fn parse_brave(payload: &Value) -> Vec<SearchResult> {
    collect_results(
        payload.get("web").and_then(|w| w.get("results")),
        "title",
        "url",
        "description",
    )
}

fn collect_results(
    items: Option<&Value>,
    title_key: &str,
    url_key: &str,
    snippet_key: &str,
) -> Vec<SearchResult> {
    let Some(items) = items.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for item in items {
        let title = item.get(title_key).and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get(url_key).and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get(snippet_key).and_then(|v| v.as_str()).unwrap_or("");

        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
            });
        }
    }
    results
}
