//! Legal chat backend: document and image extraction, retrieval tools, a
//! bounded tool-calling agent over a hosted model, per-user chat history
//! and the HTTP API tying them together.

pub mod agent;
pub mod auth;
pub mod core;
pub mod extract;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
