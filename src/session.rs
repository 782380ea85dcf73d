//! Session controller
//!
//! One conversational turn: record the query, keep the window bounded,
//! run the agent, record the reply, and cache the new state.

use crate::agent::{Agent, AgentEvent};
use crate::memory::{ContextManager, ContextSummarizer, HistoryStore, SessionStore};
use crate::models::{Artifact, ChatMessage, Role, SessionState, TurnOutcome};
use crate::Result;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared collaborators a session needs
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn SessionStore>,
    pub history_store: Option<Arc<dyn HistoryStore>>,
    pub agent: Arc<dyn Agent>,
    pub summarizer: Arc<ContextSummarizer>,
}

/// A conversation bound to one session id
pub struct RagSession {
    session_id: String,
    deps: SessionDeps,
    context_manager: ContextManager,
    /// Serializes turns so load/mutate/save never interleave
    turn_lock: Mutex<()>,
}

/// Build a session; a fresh id is generated when none is given
pub fn create_session(
    deps: SessionDeps,
    history_max_messages: usize,
    session_id: Option<String>,
) -> RagSession {
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(session_id = %session_id, "Session ready");
    RagSession::new(session_id, deps, ContextManager::with_limit(history_max_messages))
}

impl RagSession {
    pub fn new(session_id: String, deps: SessionDeps, context_manager: ContextManager) -> Self {
        Self {
            session_id,
            deps,
            context_manager,
            turn_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history_max_messages(&self) -> usize {
        self.context_manager.limit()
    }

    /// Current cached state
    pub async fn state(&self) -> SessionState {
        self.deps.store.load(&self.session_id).await
    }

    /// Process one user query and return the assistant reply with any artifacts
    pub async fn process_query(&self, query: &str) -> Result<TurnOutcome> {
        let _turn = self.turn_lock.lock().await;

        let SessionState { mut history, summary } = self.state().await;

        history.push(ChatMessage::user(query));
        self.persist_message(Role::User, query).await?;
        let (mut history, mut summary) = self
            .context_manager
            .apply(history, summary, &self.deps.summarizer)
            .await;

        let messages = Self::outbound_messages(&history, &summary);
        debug!(
            session_id = %self.session_id,
            messages = messages.len(),
            has_summary = !summary.is_empty(),
            "Invoking agent"
        );

        let mut events = self.deps.agent.stream(messages).await?;
        let mut last_text: Option<String> = None;
        let mut artifacts = Vec::new();

        while let Some(event) = events.next().await {
            match event? {
                AgentEvent::Assistant { text, tool_calls } => {
                    artifacts.extend(tool_calls.into_iter().map(Artifact::ToolCall));
                    let text = text.trim();
                    if !text.is_empty() {
                        last_text = Some(text.to_string());
                    }
                }
                AgentEvent::Tool { name, artifact, .. } => {
                    if let Some(payload) = artifact.filter(has_payload) {
                        artifacts.push(Artifact::ToolOutput { tool: name, payload });
                    }
                }
            }
        }

        if let Some(text) = &last_text {
            history.push(ChatMessage::assistant(text.as_str()));
            self.persist_message(Role::Assistant, text).await?;
            (history, summary) = self
                .context_manager
                .apply(history, summary, &self.deps.summarizer)
                .await;
        }

        self.deps
            .store
            .save(&self.session_id, &SessionState { history, summary })
            .await?;

        info!(
            session_id = %self.session_id,
            replied = last_text.is_some(),
            artifacts = artifacts.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply: last_text.unwrap_or_default(),
            artifacts,
        })
    }

    /// Seed an empty cached window from the durable log
    pub async fn restore_history(&self) -> Result<()> {
        let Some(history_store) = &self.deps.history_store else {
            return Ok(());
        };

        let _turn = self.turn_lock.lock().await;
        let state = self.state().await;
        if !state.history.is_empty() {
            return Ok(());
        }

        let limit = i64::try_from(self.history_max_messages()).unwrap_or(i64::MAX);
        let rows = history_store
            .get_recent_messages(&self.session_id, limit)
            .await?;
        if rows.is_empty() {
            return Ok(());
        }

        info!(session_id = %self.session_id, messages = rows.len(), "Restored session history");
        let seeded = SessionState {
            history: rows.into_iter().map(ChatMessage::from).collect(),
            summary: state.summary,
        };
        self.deps.store.save(&self.session_id, &seeded).await
    }

    fn outbound_messages(history: &[ChatMessage], summary: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !summary.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Conversation summary:\n{}",
                summary
            )));
        }
        messages.extend_from_slice(history);
        messages
    }

    async fn persist_message(&self, role: Role, content: &str) -> Result<()> {
        match &self.deps.history_store {
            Some(store) => store.append_message(&self.session_id, role, content).await,
            None => Ok(()),
        }
    }
}

/// Null, `false`, zero, empty strings and empty collections carry nothing worth surfacing
fn has_payload(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
