//! Session state cache
//!
//! Holds the bounded history window and rolling summary between turns.
//! Loading never fails: anything unreadable comes back as an empty state.

use crate::error::ChatError;
use crate::models::SessionState;
use crate::Result;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

/// Trait for session state persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load cached state, or an empty state when absent or unreadable
    async fn load(&self, session_id: &str) -> SessionState;

    /// Overwrite the cached state
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()>;
}

/// Process-lifetime session store
pub struct InMemorySessionStore {
    states: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> SessionState {
        let states = self.states.read().await;
        states.get(session_id).cloned().unwrap_or_default()
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let mut states = self.states.write().await;
        states.insert(session_id.to_string(), state.clone());
        Ok(())
    }
}

/// Redis-backed session store. State is stored as JSON under `{prefix}{session_id}`.
pub struct RedisSessionStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            ChatError::SessionStore(format!("Invalid redis url {}: {}", url, e))
        })?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.into(),
        })
    }

    pub fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                self.client.get_multiplexed_async_connection().await
            })
            .await
            .map_err(|e| ChatError::SessionStore(format!("Redis connection failed: {}", e)))?;

        Ok(connection.clone())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| ChatError::SessionStore(format!("Redis GET {} failed: {}", key, e)))?;
        Ok(raw)
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> SessionState {
        let key = self.key(session_id);

        let raw = match self.fetch(&key).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return SessionState::default(),
            Err(e) => {
                warn!(session_id, "Session state load failed, starting empty: {}", e);
                return SessionState::default();
            }
        };

        decode_state(&raw).unwrap_or_else(|e| {
            warn!(session_id, "Session state is not valid JSON, starting empty: {}", e);
            SessionState::default()
        })
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let key = self.key(session_id);
        let payload = serde_json::to_string(state)?;

        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(&key, payload)
            .await
            .map_err(|e| ChatError::SessionStore(format!("Redis SET {} failed: {}", key, e)))?;

        debug!(session_id, messages = state.history.len(), "Saved session state");
        Ok(())
    }
}

fn decode_state(raw: &str) -> Result<SessionState> {
    Ok(serde_json::from_str(raw)?)
}
