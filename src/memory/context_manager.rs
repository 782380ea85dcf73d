//! History window management
//!
//! Keeps the short-term history within `history_max_messages` and folds
//! anything older into the rolling summary.

use crate::memory::summarizer::ContextSummarizer;
use crate::models::ChatMessage;
use tracing::info;

/// Configuration for the history window
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum messages kept verbatim in the session window
    pub history_max_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_max_messages: 30,
        }
    }
}

/// Applies the summarization trigger to a session window
#[derive(Debug, Clone)]
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn with_limit(history_max_messages: usize) -> Self {
        Self::with_config(ContextConfig {
            history_max_messages,
        })
    }

    /// Effective bound; a zero limit would drop the current message
    pub fn limit(&self) -> usize {
        self.config.history_max_messages.max(1)
    }

    /// Drain the messages beyond the bound from the front of `history`
    pub fn split_overflow(&self, history: &mut Vec<ChatMessage>) -> Option<Vec<ChatMessage>> {
        let limit = self.limit();
        if history.len() <= limit {
            return None;
        }

        let excess = history.len() - limit;
        Some(history.drain(..excess).collect())
    }

    /// Fold overflow into the summary. A no-op while the window is within bounds.
    pub async fn apply(
        &self,
        mut history: Vec<ChatMessage>,
        summary: String,
        summarizer: &ContextSummarizer,
    ) -> (Vec<ChatMessage>, String) {
        let Some(overflow) = self.split_overflow(&mut history) else {
            return (history, summary);
        };

        info!(
            overflow = overflow.len(),
            kept = history.len(),
            "History window exceeded, folding into summary"
        );
        let summary = summarizer.summarize(&summary, &overflow).await;
        (history, summary)
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ChatModel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatModel for CountingModel {
        async fn invoke(&self, prompt: &str) -> crate::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("summary of {} lines", prompt.lines().count()))
        }
    }

    fn numbered(count: usize) -> Vec<ChatMessage> {
        (0..count)
            .map(|i| ChatMessage::user(format!("m{}", i)))
            .collect()
    }

    fn counting() -> (Arc<CountingModel>, ContextSummarizer) {
        let model = Arc::new(CountingModel {
            calls: AtomicUsize::new(0),
        });
        let summarizer = ContextSummarizer::new(model.clone());
        (model, summarizer)
    }

    #[test]
    fn test_context_manager_creation() {
        let manager = ContextManager::new();
        assert_eq!(manager.config().history_max_messages, 30);
        assert_eq!(ContextManager::with_limit(0).limit(), 1);
    }

    #[test]
    fn test_split_overflow_keeps_newest() {
        let manager = ContextManager::with_limit(4);
        let original = numbered(7);

        let mut history = original.clone();
        let overflow = manager.split_overflow(&mut history).unwrap();
        assert_eq!(overflow, original[..3].to_vec());
        assert_eq!(history, original[3..].to_vec());

        let mut bounded = numbered(4);
        assert!(manager.split_overflow(&mut bounded).is_none());
        assert_eq!(bounded.len(), 4);
    }

    #[tokio::test]
    async fn test_within_bound_is_noop() {
        let manager = ContextManager::with_limit(5);
        let (model, summarizer) = counting();

        for len in 0..=5 {
            let history = numbered(len);
            let (after, summary) = manager
                .apply(history.clone(), "s".to_string(), &summarizer)
                .await;
            assert_eq!(after, history);
            assert_eq!(summary, "s");
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_over_bound_trims_to_limit() {
        let manager = ContextManager::with_limit(3);
        let (model, summarizer) = counting();

        let original = numbered(8);
        let (after, summary) = manager
            .apply(original.clone(), String::new(), &summarizer)
            .await;

        assert_eq!(after.len(), 3);
        assert_eq!(after, original[5..].to_vec());
        assert!(summary.starts_with("summary of"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let manager = ContextManager::with_limit(2);
        let (model, summarizer) = counting();

        let (once, summary_once) = manager
            .apply(numbered(5), String::new(), &summarizer)
            .await;
        let (twice, summary_twice) = manager
            .apply(once.clone(), summary_once.clone(), &summarizer)
            .await;

        assert_eq!(once, twice);
        assert_eq!(summary_once, summary_twice);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
