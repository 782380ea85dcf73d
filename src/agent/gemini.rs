//! Gemini-powered tool-calling agent
//!
//! Runs generate → call tools → feed results back until the model answers
//! without requesting a tool. Each step is reported as an `AgentEvent`.

use crate::agent::{Agent, AgentEvent, EventStream};
use crate::gemini::{Content, GeminiClient, GenerateRequest, GenerationConfig, Part, ToolDeclarations};
use crate::models::{ChatMessage, Role, ToolCallRequest};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_TOOL_ROUNDS: u32 = 8;

pub const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that has access to a personal vault of notes. Your primary goal is to answer the user's questions and help them with their tasks. You have access to two tools:
1. `retrieve_context`: Use this tool to find relevant information from the vault. When you use this tool, you should inform the user that you are searching for information.
2. `write_to_vault`: Use this tool to write new notes to the vault. Use it when the user asks you to create a new note or when saving information for later would clearly help.

When answering a question, use the following process:
1. First, consider if the user's question can be answered from the conversation history.
2. If it cannot, use the `retrieve_context` tool with a search query built from the question and the conversation history.
3. If you are still unable to answer, tell the user you could not find an answer.

Ask clarifying questions if the user's query is ambiguous, and use the conversation history to give context-aware responses."#;

pub struct GeminiAgent {
    inner: Arc<AgentCore>,
}

struct AgentCore {
    client: GeminiClient,
    tools: ToolRegistry,
    system_prompt: String,
}

impl GeminiAgent {
    pub fn new(client: GeminiClient, tools: ToolRegistry) -> Self {
        Self {
            inner: Arc::new(AgentCore {
                client,
                tools,
                system_prompt: SYSTEM_PROMPT.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded();
        let core = self.inner.clone();

        tokio::spawn(async move {
            if let Err(e) = core.run(messages, &tx).await {
                // Receiver may already be gone; nothing else to report to.
                let _ = tx.unbounded_send(Err(e));
            }
        });

        Ok(rx.boxed())
    }
}

impl AgentCore {
    /// System text plus the conversation, mapped to Gemini roles
    fn build_contents(&self, messages: &[ChatMessage]) -> (Content, Vec<Content>) {
        let mut system_text = self.system_prompt.clone();
        let mut contents = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role {
                Role::System => {
                    system_text.push_str("\n\n");
                    system_text.push_str(&msg.content);
                }
                Role::User => contents.push(Content::text("user", msg.content.as_str())),
                Role::Assistant => contents.push(Content::text("model", msg.content.as_str())),
            }
        }

        let system = Content {
            role: None,
            parts: vec![Part::text(system_text)],
        };
        (system, contents)
    }

    async fn run(
        &self,
        messages: Vec<ChatMessage>,
        tx: &UnboundedSender<Result<AgentEvent>>,
    ) -> Result<()> {
        let (system, mut contents) = self.build_contents(&messages);
        let declarations = self.tools.declarations();
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: declarations,
            }]
        };

        for round in 1..=MAX_TOOL_ROUNDS {
            let request = GenerateRequest {
                contents: contents.clone(),
                system_instruction: Some(system.clone()),
                tools: tools.clone(),
                generation_config: GenerationConfig::default(),
            };

            let reply = self.client.generate(&request).await?;
            let tool_calls: Vec<ToolCallRequest> = reply
                .function_calls()
                .map(|call| ToolCallRequest {
                    name: call.name.clone(),
                    args: call.args.clone(),
                })
                .collect();

            let event = AgentEvent::Assistant {
                text: reply.joined_text(),
                tool_calls: tool_calls.clone(),
            };
            if tx.unbounded_send(Ok(event)).is_err() {
                debug!("Agent stream dropped by consumer");
                return Ok(());
            }

            if tool_calls.is_empty() {
                return Ok(());
            }

            debug!(round, calls = tool_calls.len(), "Model requested tools");
            contents.push(Content {
                role: Some("model".to_string()),
                parts: reply.parts,
            });

            let mut responses = Vec::with_capacity(tool_calls.len());
            for call in tool_calls {
                let (event, response) = match self.tools.execute(&call.name, &call.args).await {
                    Ok(output) => {
                        info!(tool = %call.name, "Tool call succeeded");
                        let response = json!({ "content": output.content.clone() });
                        let event = AgentEvent::Tool {
                            name: call.name.clone(),
                            content: output.content,
                            artifact: output.artifact,
                        };
                        (event, response)
                    }
                    Err(e) => {
                        warn!(tool = %call.name, "Tool call failed: {}", e);
                        let message = e.to_string();
                        let event = AgentEvent::Tool {
                            name: call.name.clone(),
                            content: message.clone(),
                            artifact: None,
                        };
                        (event, json!({ "error": message }))
                    }
                };

                if tx.unbounded_send(Ok(event)).is_err() {
                    return Ok(());
                }
                responses.push(Part::function_response(call.name, response));
            }

            contents.push(Content {
                role: Some("user".to_string()),
                parts: responses,
            });
        }

        warn!("Agent stopped after {} tool rounds", MAX_TOOL_ROUNDS);
        Ok(())
    }
}
