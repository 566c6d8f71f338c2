pub mod openai;
pub mod provider;
pub mod types;


pub use openai::OpenAiCompatibleProvider;
pub use provider::{ChatModel, LlmError};
pub use types::{ChatCompletion, ChatMessage, ChatRequest, Role, ToolCall, ToolSpec};
