//! Model and agent boundary
//!
//! `ChatModel` is a single prompt-in, text-out call used for summarization.
//! `Agent` runs a tool-calling conversation and reports what happened as a
//! stream of typed events, decoded once at this boundary.

use crate::models::{ChatMessage, ToolCallRequest};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

pub mod gemini;
pub use gemini::GeminiAgent;

/// Direct model invocation
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Something observed while the agent works on a turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A model message: its text (possibly empty) and any tools it asked for
    Assistant {
        text: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    /// A tool finished; `artifact` is the raw payload attached to its result
    Tool {
        name: String,
        content: String,
        artifact: Option<Value>,
    },
}

pub type EventStream = BoxStream<'static, Result<AgentEvent>>;

/// Tool-calling agent
#[async_trait]
pub trait Agent: Send + Sync {
    /// Start a run over `messages`. Events arrive in the order they happen.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<EventStream>;
}
