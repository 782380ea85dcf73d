//! Chat Memory System
//!
//! Session state cache, durable history log, and rolling summarization
//! that keeps the window sent to the model bounded.

pub mod context_manager;
pub mod history_store;
pub mod session_store;
pub mod summarizer;

pub use context_manager::{ContextConfig, ContextManager};
pub use history_store::{
    create_history_store, HistoryStore, PostgresHistoryStore, SqliteHistoryStore,
};
pub use session_store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use summarizer::ContextSummarizer;

use crate::config::{SessionStoreKind, Settings};
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Build the configured session state backend
pub fn create_session_store(settings: &Settings) -> Result<Arc<dyn SessionStore>> {
    match settings.session_store {
        SessionStoreKind::Redis => {
            let store = RedisSessionStore::new(&settings.redis_url(), settings.redis_prefix.clone())?;
            info!(host = %settings.redis_host, "Session store backend: redis");
            Ok(Arc::new(store))
        }
        SessionStoreKind::Memory => {
            info!("Session store backend: in-memory");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
    }
}
