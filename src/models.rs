//! Core data models for the vault chat client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

//
// ================= Enums =================
//

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Decode a role column. Unknown values are treated as user input.
    pub fn from_db(role: &str) -> Self {
        match role.trim().to_lowercase().as_str() {
            "assistant" | "ai" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Messages =================
//

/// One entry of the short-term history window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A row of the durable message log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(message: StoredMessage) -> Self {
        ChatMessage::new(message.role, message.content)
    }
}

//
// ================= Session =================
//

/// Cached per-session state: the bounded history window plus the rolling summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub summary: String,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.summary.is_empty()
    }
}

/// One row of the session listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    /// Content of the session's first user message
    pub title: Option<String>,
}

//
// ================= Artifacts =================
//

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Payload surfaced alongside an assistant reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    ToolCall(ToolCallRequest),
    ToolOutput { tool: String, payload: Value },
}

/// Result of a single conversational turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Final assistant text, empty when the agent produced none
    pub reply: String,
    pub artifacts: Vec<Artifact>,
}

impl TurnOutcome {
    /// Whether the agent produced any text worth showing
    pub fn has_reply(&self) -> bool {
        !self.reply.is_empty()
    }
}
