//! Tool-calling loop around the hosted model.
//!
//! One request walks `Idle -> ToolDecision -> (ToolExecuting -> ToolDecision)*
//! -> Responding -> Done`. The number of tool rounds is capped; hitting the
//! cap forces one last call with tools withheld. Model failures abort the
//! request, tool failures are recorded and the loop carries on.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

use super::answer::parse_answer;
use super::prompt::{EMPTY_RESPONSE_FALLBACK, FINAL_RESPONSE_INSTRUCTION, LEGAL_SYSTEM_PROMPT};
use crate::core::errors::ApiError;
use crate::history::Message;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, Role, ToolCall};
use crate::tools::{Source, ToolError, ToolOutput, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    ToolDecision,
    ToolExecuting,
    Responding,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentAction {
    pub action: String,
    pub description: String,
    pub timestamp: String,
}

/// One executed tool call, folded into the assistant message metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: Value,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Display text.
    pub text: String,
    /// Unparsed final model output.
    pub raw: String,
    pub structured: Option<Value>,
    pub sources: Vec<Source>,
    pub invocations: Vec<ToolInvocation>,
    pub actions: Vec<AgentAction>,
    pub tool_errors: Vec<String>,
    pub tool_rounds: usize,
    /// Set when the round cap forced the final tool-less call.
    pub forced_final: bool,
    pub phases: Vec<AgentPhase>,
}

impl AgentReply {
    pub fn degraded(&self) -> bool {
        !self.tool_errors.is_empty()
    }

    /// Action labels of tools that contributed at least one source.
    pub fn tools_used(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for (invocation, action) in self.invocations.iter().zip(self.actions.iter()) {
            if invocation.error.is_none()
                && !invocation.sources.is_empty()
                && !used.contains(&action.action)
            {
                used.push(action.action.clone());
            }
        }
        used
    }

    pub fn metadata(&self) -> Value {
        json!({
            "raw": self.raw,
            "structured_response": self.structured,
            "sources": self.sources,
            "tool_invocations": self.invocations,
            "tool_errors": self.tool_errors,
            "tool_rounds": self.tool_rounds,
        })
    }
}

struct RunState {
    phases: Vec<AgentPhase>,
    sources: Vec<Source>,
    invocations: Vec<ToolInvocation>,
    actions: Vec<AgentAction>,
    tool_errors: Vec<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phases: vec![AgentPhase::Idle],
            sources: Vec::new(),
            invocations: Vec::new(),
            actions: Vec::new(),
            tool_errors: Vec::new(),
        }
    }

    fn enter(&mut self, next: AgentPhase) {
        let current = self.phases.last().copied().unwrap_or(AgentPhase::Idle);
        tracing::debug!("Agent phase {:?} -> {:?}", current, next);
        self.phases.push(next);
    }

    fn add_sources(&mut self, sources: Vec<Source>) {
        for source in sources {
            let duplicate = self.sources.iter().any(|existing| match (&existing.url, &source.url) {
                (Some(a), Some(b)) => a == b,
                _ => existing.title == source.title && existing.snippet == source.snippet,
            });
            if !duplicate {
                self.sources.push(source);
            }
        }
    }
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_tool_rounds: usize,
    temperature: f64,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        max_tool_rounds: usize,
        temperature: f64,
    ) -> Self {
        Self {
            model,
            tools,
            max_tool_rounds,
            temperature,
        }
    }

    pub async fn run(&self, history: &[Message], prompt: &str) -> Result<AgentReply, ApiError> {
        let mut state = RunState::new();
        let mut messages = build_messages(history, prompt);
        let specs = self.tools.specs();
        let mut rounds = 0;

        state.enter(AgentPhase::ToolDecision);
        while rounds < self.max_tool_rounds {
            let request = ChatRequest::new(messages.clone())
                .with_tools(specs.clone())
                .with_temperature(self.temperature);
            let completion = self.model.complete(request).await.map_err(|e| {
                tracing::error!("Hosted model call failed: {}", e);
                ApiError::agent_unavailable(e)
            })?;

            if !completion.wants_tools() {
                tracing::info!("Model answered directly after {} tool round(s)", rounds);
                state.enter(AgentPhase::Responding);
                return Ok(self.finish(state, completion.content, rounds, false));
            }

            rounds += 1;
            state.enter(AgentPhase::ToolExecuting);
            tracing::info!(
                "Tool round {}/{}: {} call(s)",
                rounds,
                self.max_tool_rounds,
                completion.tool_calls.len()
            );
            messages.push(ChatMessage::assistant_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));

            let results = join_all(completion.tool_calls.iter().map(|call| self.execute(call))).await;
            for (call, result) in completion.tool_calls.iter().zip(results) {
                let message = self.record(&mut state, call, result);
                messages.push(ChatMessage::tool(call.id.clone(), message));
            }

            state.enter(AgentPhase::ToolDecision);
        }

        tracing::info!(
            "Reached tool round limit ({}), forcing final response",
            self.max_tool_rounds
        );
        state.enter(AgentPhase::Responding);
        messages.push(ChatMessage::system(FINAL_RESPONSE_INSTRUCTION));
        let request = ChatRequest::new(messages).with_temperature(self.temperature);
        let completion = self.model.complete(request).await.map_err(|e| {
            tracing::error!("Hosted model call failed: {}", e);
            ApiError::agent_unavailable(e)
        })?;

        Ok(self.finish(state, completion.content, rounds, true))
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        if !call.arguments.is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "arguments for {} must be a JSON object",
                call.name
            )));
        }
        tool.invoke(&call.arguments).await
    }

    /// Records the outcome and returns the tool message for the model.
    fn record(
        &self,
        state: &mut RunState,
        call: &ToolCall,
        result: Result<ToolOutput, ToolError>,
    ) -> String {
        let (action, description) = match self.tools.get(&call.name) {
            Some(tool) => (tool.action().to_string(), tool.describe(&call.arguments)),
            None => (
                "unknown_tool".to_string(),
                format!("Requested unknown tool '{}'", call.name),
            ),
        };
        state.actions.push(AgentAction {
            action,
            description,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        match result {
            Ok(output) => {
                state.add_sources(output.sources.clone());
                state.invocations.push(ToolInvocation {
                    tool: call.name.clone(),
                    input: call.arguments.clone(),
                    sources: output.sources,
                    error: None,
                });
                output.text
            }
            Err(err) => {
                tracing::warn!("Tool {} failed: {}", call.name, err);
                let summary = format!("{}: {}", call.name, err);
                state.tool_errors.push(summary);
                state.invocations.push(ToolInvocation {
                    tool: call.name.clone(),
                    input: call.arguments.clone(),
                    sources: Vec::new(),
                    error: Some(err.to_string()),
                });
                format!("Error: {}", err)
            }
        }
    }

    fn finish(
        &self,
        mut state: RunState,
        content: Option<String>,
        tool_rounds: usize,
        forced_final: bool,
    ) -> AgentReply {
        let raw = content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| EMPTY_RESPONSE_FALLBACK.to_string());
        let parsed = parse_answer(&raw);
        let text = if parsed.text.is_empty() {
            EMPTY_RESPONSE_FALLBACK.to_string()
        } else {
            parsed.text
        };
        state.enter(AgentPhase::Done);

        AgentReply {
            text,
            raw,
            structured: parsed.structured,
            sources: state.sources,
            invocations: state.invocations,
            actions: state.actions,
            tool_errors: state.tool_errors,
            tool_rounds,
            forced_final,
            phases: state.phases,
        }
    }
}

/// System prompt, replayed user/assistant history, then this turn.
fn build_messages(history: &[Message], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(LEGAL_SYSTEM_PROMPT)];
    for message in history {
        match message.role {
            Role::User => messages.push(ChatMessage::user(message.model_text())),
            Role::Assistant => messages.push(ChatMessage::assistant(message.model_text())),
            Role::System | Role::Tool => {}
        }
    }
    messages.push(ChatMessage::user(prompt));
    messages
}
