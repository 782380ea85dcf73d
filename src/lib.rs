//! Vault Chat
//!
//! A terminal chat client that answers questions from a personal note vault:
//! - Retrieves note context through tool calls made by a Gemini agent
//! - Caches each session's recent window (in memory or Redis)
//! - Logs every message durably (SQLite or Postgres)
//! - Folds older turns into a rolling summary to keep the window bounded
//! - Resumes earlier sessions from the durable log
//!
//! TURN LOOP:
//! QUERY → RECORD → TRIM → AGENT (↔ TOOLS) → RECORD → TRIM → CACHE

pub mod agent;
pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod models;
pub mod session;
pub mod sessions;
pub mod tools;
pub mod ui;

pub use error::Result;

// Re-export common types
pub use config::Settings;
pub use models::*;
pub use session::{create_session, RagSession, SessionDeps};
