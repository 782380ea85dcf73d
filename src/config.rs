//! Settings loading
//!
//! `.env` is loaded first, then a JSON settings file found through
//! `RAG_CONFIG_PATH` (default `config.json`).

use crate::error::ChatError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_PATH_ENV: &str = "RAG_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Which backend caches in-flight session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    #[default]
    Memory,
    Redis,
}

/// Which backend keeps the durable message log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStoreKind {
    #[default]
    Sqlite,
    Postgres,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub vault_path: PathBuf,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_history_max_messages")]
    pub history_max_messages: usize,

    #[serde(default)]
    pub session_store: SessionStoreKind,
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_db: i64,
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    #[serde(default)]
    pub history_store: HistoryStoreKind,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    #[serde(default)]
    pub postgres_dsn: Option<String>,

    /// How many past sessions the picker offers
    #[serde(default = "default_session_list_limit")]
    pub session_list_limit: i64,
}

fn default_chat_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_history_max_messages() -> usize {
    30
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_prefix() -> String {
    "rag:session:".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./chat_history.db")
}

fn default_session_list_limit() -> i64 {
    10
}

impl Settings {
    /// Load `.env` and the settings file named by `RAG_CONFIG_PATH`
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let raw = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(resolve_path(&raw))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChatError::Config(format!(
                "Config file not found at {}. Copy config.example.json to config.json and update it.",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&text)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut settings: Settings = serde_json::from_str(text)
            .map_err(|e| ChatError::Config(format!("Invalid config file: {}", e)))?;
        settings.vault_path = expand_tilde(&settings.vault_path.to_string_lossy());
        settings.sqlite_path = expand_tilde(&settings.sqlite_path.to_string_lossy());
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vault_path.as_os_str().is_empty() {
            return Err(ChatError::Config("Missing required config key: vault_path".to_string()));
        }
        if self.chat_model.trim().is_empty() {
            return Err(ChatError::Config("Missing required config key: chat_model".to_string()));
        }
        if self.history_store == HistoryStoreKind::Postgres
            && self.postgres_dsn.as_deref().map_or(true, |dsn| dsn.trim().is_empty())
        {
            return Err(ChatError::Config(
                "Missing required config key: postgres_dsn".to_string(),
            ));
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_path(raw: &str) -> PathBuf {
    let path = expand_tilde(raw);
    if path.is_absolute() {
        return path;
    }
    env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
