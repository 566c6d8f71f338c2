use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{ChatModel, LlmError};
use super::types::{ChatCompletion, ChatRequest, ToolCall};
use crate::core::config::settings::LlmSettings;

/// Client for any OpenAI-compatible `/chat/completions` + `/embeddings` API.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: &LlmSettings, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            client,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let url = format!("{}/{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        res.json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let messages: Vec<Value> = request.messages.iter().map(|m| m.to_wire()).collect();
        let mut body = json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if !request.tools.is_empty() {
                let tools: Vec<Value> = request.tools.iter().map(|t| t.to_wire()).collect();
                obj.insert("tools".to_string(), Value::Array(tools));
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
        }

        let payload = self.post("chat/completions", &body).await?;
        parse_completion(&payload)
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({
            "model": self.embedding_model,
            "input": input,
        });

        let payload = self.post("embeddings", &body).await?;
        let vector: Vec<f32> = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::Malformed("missing data[0].embedding".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.is_empty() {
            return Err(LlmError::Malformed("empty embedding".to_string()));
        }
        Ok(vector)
    }
}

pub(crate) fn parse_completion(payload: &Value) -> Result<ChatCompletion, LlmError> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message".to_string()))?;

    let content = message["content"]
        .as_str()
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty());

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(index, call)| {
                    let name = call["function"]["name"].as_str()?.to_string();
                    let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments = serde_json::from_str::<Value>(raw_args)
                        .unwrap_or_else(|_| Value::String(raw_args.to_string()));
                    let id = call["id"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_{}", index));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatCompletion {
        content,
        tool_calls,
    })
}
