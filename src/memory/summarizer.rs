//! Rolling summarization
//!
//! Folds overflow history into the running summary with a single model call.
//! Never fails: on any problem the previous summary is kept.

use crate::agent::ChatModel;
use crate::models::ChatMessage;
use std::sync::Arc;
use tracing::{info, warn};

/// Summarizes conversation overflow using a chat model
pub struct ContextSummarizer {
    model: Arc<dyn ChatModel>,
}

impl ContextSummarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Merge `messages` into `existing_summary`
    pub async fn summarize(&self, existing_summary: &str, messages: &[ChatMessage]) -> String {
        if messages.is_empty() {
            return existing_summary.to_string();
        }

        let transcript = Self::format_messages_for_summary(messages);
        if transcript.is_empty() {
            return existing_summary.to_string();
        }

        let prompt = Self::build_prompt(existing_summary, &transcript);

        info!("Summarizing {} overflow messages", messages.len());

        match self.model.invoke(&prompt).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!("Summarizer returned an empty response, keeping previous summary");
                    existing_summary.to_string()
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                warn!("Failed to summarize context, keeping previous summary: {}", e);
                existing_summary.to_string()
            }
        }
    }

    /// One `ROLE: content` line per non-blank message
    fn format_messages_for_summary(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .filter(|msg| !msg.content.is_empty())
            .map(|msg| format!("{}: {}", msg.role.as_str().to_uppercase(), msg.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn build_prompt(existing_summary: &str, transcript: &str) -> String {
        let existing = if existing_summary.is_empty() {
            "None"
        } else {
            existing_summary
        };

        format!(
            r#"You are summarizing a conversation for future context.
Keep it concise (under 300 words) and focus on user goals, decisions, constraints, and key facts.

Existing summary:
{}

New conversation excerpt:
{}

Updated summary:"#,
            existing, transcript
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ChatModel;
    use crate::error::ChatError;
    use std::sync::Mutex;

    struct FailingModel;

    #[async_trait::async_trait]
    impl ChatModel for FailingModel {
        async fn invoke(&self, _prompt: &str) -> crate::Result<String> {
            Err(ChatError::LlmError("boom".to_string()))
        }
    }

    struct RecordingModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for RecordingModel {
        async fn invoke(&self, prompt: &str) -> crate::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_prior_summary() {
        let summarizer = ContextSummarizer::new(Arc::new(FailingModel));
        let result = summarizer
            .summarize("prior summary", &[ChatMessage::user("hi")])
            .await;
        assert_eq!(result, "prior summary");
    }

    #[tokio::test]
    async fn test_empty_messages_skip_model() {
        let model = Arc::new(RecordingModel::new("new"));
        let summarizer = ContextSummarizer::new(model.clone());

        assert_eq!(summarizer.summarize("kept", &[]).await, "kept");
        assert_eq!(
            summarizer.summarize("kept", &[ChatMessage::user("")]).await,
            "kept"
        );
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_response_falls_back() {
        let summarizer = ContextSummarizer::new(Arc::new(RecordingModel::new("   \n")));
        let result = summarizer
            .summarize("old", &[ChatMessage::user("question")])
            .await;
        assert_eq!(result, "old");
    }

    #[tokio::test]
    async fn test_prompt_contents() {
        let model = Arc::new(RecordingModel::new("  merged summary  "));
        let summarizer = ContextSummarizer::new(model.clone());

        let result = summarizer
            .summarize(
                "",
                &[
                    ChatMessage::user("What is in my garden note?"),
                    ChatMessage::assistant(""),
                    ChatMessage::assistant("Tomatoes and basil."),
                ],
            )
            .await;
        assert_eq!(result, "merged summary");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("Existing summary:\nNone"));
        assert!(prompt.contains("USER: What is in my garden note?\nASSISTANT: Tomatoes and basil."));
        assert!(prompt.contains("under 300 words"));
        assert!(prompt.ends_with("Updated summary:"));
    }
}
