//! Tool trait and registry
//!
//! Vault tools the agent can call: context retrieval and note writing.

use crate::error::ChatError;
use crate::gemini::FunctionDeclaration;
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod retriever;
pub use retriever::{RetrievalHit, Retriever, VaultScanRetriever};

/// Number of hits `retrieve_context` asks the retriever for
const RETRIEVE_TOP_K: usize = 10;
const NOTE_FOLDER: &str = "AI Generated";
const SEPARATOR_WIDTH: usize = 30;

/// What a tool hands back: text for the model, plus an optional raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub artifact: Option<Value>,
}

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, args: &Value) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub async fn execute(&self, name: &str, args: &Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ChatError::ToolNotFound(name.to_string()))?;
        tool.execute(args).await
    }

    /// Function declarations in a stable order
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with the two vault tools
pub fn create_vault_registry(
    vault_path: impl Into<PathBuf>,
    retriever: Arc<dyn Retriever>,
) -> ToolRegistry {
    let vault_path = vault_path.into();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RetrieveContextTool::new(vault_path.clone(), retriever)));
    registry.register(Arc::new(WriteToVaultTool::new(vault_path)));
    registry
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ChatError::InvalidToolInput(format!("missing string argument '{}'", key)))
}

// =============================
// retrieve_context
// =============================

/// Finds relevant notes and returns their full text
pub struct RetrieveContextTool {
    vault_path: PathBuf,
    retriever: Arc<dyn Retriever>,
}

impl RetrieveContextTool {
    pub fn new(vault_path: PathBuf, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            vault_path,
            retriever,
        }
    }
}

#[async_trait::async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &'static str {
        "retrieve_context"
    }

    fn description(&self) -> &'static str {
        "Retrieve information to help answer a query by reading full files from the vault."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query describing the information needed"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput> {
        let query = required_str(args, "query")?;
        let hits = self.retriever.search(query, RETRIEVE_TOP_K).await?;

        let mut seen: Vec<&str> = Vec::new();
        let mut context_parts = Vec::new();
        let separator = "=".repeat(SEPARATOR_WIDTH);

        for hit in &hits {
            if seen.contains(&hit.source.as_str()) {
                continue;
            }
            seen.push(hit.source.as_str());

            match tokio::fs::read_to_string(self.vault_path.join(&hit.source)).await {
                Ok(full_content) => context_parts.push(format!(
                    "FILE SOURCE: {}\n{}\n{}\n{}",
                    hit.source, separator, full_content, separator
                )),
                Err(e) => warn!(source = %hit.source, "Error reading vault file: {}", e),
            }
        }

        info!(query, files = context_parts.len(), "Retrieved vault context");

        let content = if context_parts.is_empty() {
            "No relevant documents found in the vault.".to_string()
        } else {
            context_parts.join("\n\n")
        };

        Ok(ToolOutput {
            content,
            artifact: Some(serde_json::to_value(&hits)?),
        })
    }
}

// =============================
// write_to_vault
// =============================

/// Writes a new note under the vault's `AI Generated` folder
pub struct WriteToVaultTool {
    vault_path: PathBuf,
}

impl WriteToVaultTool {
    pub fn new(vault_path: PathBuf) -> Self {
        Self { vault_path }
    }

    pub fn note_body(content: &str) -> String {
        format!(
            "Tags: [[AI Generated]]\n\n#🌱\n\n---\n\n{}\n\n---",
            content
        )
    }

    /// Only plain relative names stay inside the notes folder
    fn validate_file_name(file_name: &str) -> Result<&Path> {
        let path = Path::new(file_name);
        let is_plain = !file_name.trim().is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(ChatError::InvalidToolInput(format!(
                "file name '{}' must be a relative path inside the vault",
                file_name
            )));
        }
        Ok(path)
    }
}

#[async_trait::async_trait]
impl Tool for WriteToVaultTool {
    fn name(&self) -> &'static str {
        "write_to_vault"
    }

    fn description(&self) -> &'static str {
        "Write content to a specified file in the vault. File name should include spaces if needed and end with .md"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "Note file name ending with .md"
                },
                "content": {
                    "type": "string",
                    "description": "Markdown body of the note"
                }
            },
            "required": ["file_name", "content"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput> {
        let file_name = Self::validate_file_name(required_str(args, "file_name")?)?;
        let content = required_str(args, "content")?;

        let full_path = self.vault_path.join(NOTE_FOLDER).join(file_name);
        let note = Self::note_body(content);

        let write = async {
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&full_path, &note).await
        };
        write.await.map_err(|e| {
            ChatError::ToolError(format!("Failed to write {}: {}", full_path.display(), e))
        })?;

        info!(path = %full_path.display(), "Wrote note to vault");

        Ok(ToolOutput {
            content: format!("Content written to {}", full_path.display()),
            artifact: Some(Value::String(note)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRetriever(Vec<RetrievalHit>);

    #[async_trait::async_trait]
    impl Retriever for FixedRetriever {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    fn hit(source: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            source: source.to_string(),
            score,
        }
    }

    #[test]
    fn test_registry_lists_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = create_vault_registry(dir.path(), Arc::new(FixedRetriever(vec![])));
        assert_eq!(registry.list(), vec!["retrieve_context", "write_to_vault"]);

        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].parameters["required"][0], "query");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nope", &json!({})).await;
        assert!(matches!(result, Err(ChatError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_retrieve_context_reads_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("garden.md"), "Tomatoes need sun.").unwrap();

        let retriever = FixedRetriever(vec![
            hit("garden.md", 1.0),
            hit("garden.md", 0.5),
            hit("missing.md", 0.2),
        ]);
        let tool = RetrieveContextTool::new(dir.path().to_path_buf(), Arc::new(retriever));

        let output = tool.execute(&json!({"query": "tomatoes"})).await.unwrap();
        assert_eq!(output.content.matches("FILE SOURCE: garden.md").count(), 1);
        assert!(output.content.contains("Tomatoes need sun."));
        assert!(!output.content.contains("missing.md"));

        let artifact = output.artifact.unwrap();
        assert_eq!(artifact.as_array().unwrap().len(), 3);
        assert_eq!(artifact[0]["source"], "garden.md");
    }

    #[tokio::test]
    async fn test_retrieve_context_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RetrieveContextTool::new(dir.path().to_path_buf(), Arc::new(FixedRetriever(vec![])));

        let output = tool.execute(&json!({"query": "anything"})).await.unwrap();
        assert_eq!(output.content, "No relevant documents found in the vault.");

        let missing = tool.execute(&json!({})).await;
        assert!(matches!(missing, Err(ChatError::InvalidToolInput(_))));
    }

    #[tokio::test]
    async fn test_write_to_vault_creates_note() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteToVaultTool::new(dir.path().to_path_buf());

        let output = tool
            .execute(&json!({"file_name": "Reading List.md", "content": "- Dune"}))
            .await
            .unwrap();

        let path = dir.path().join("AI Generated").join("Reading List.md");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Tags: [[AI Generated]]"));
        assert!(written.contains("---\n\n- Dune\n\n---"));
        assert!(output.content.starts_with("Content written to"));
        assert_eq!(output.artifact, Some(Value::String(written)));
    }

    #[test]
    fn test_note_body_keeps_content_verbatim() {
        let body = WriteToVaultTool::note_body("    fn main() {}\n");
        assert!(body.contains("---\n\n    fn main() {}\n\n\n---"));
        assert!(body.starts_with("Tags: [[AI Generated]]"));
    }

    #[tokio::test]
    async fn test_write_to_vault_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteToVaultTool::new(dir.path().to_path_buf());

        for name in ["../outside.md", "/etc/passwd", ""] {
            let result = tool
                .execute(&json!({"file_name": name, "content": "x"}))
                .await;
            assert!(matches!(result, Err(ChatError::InvalidToolInput(_))), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_write_to_vault_reports_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the notes folder should be
        std::fs::write(dir.path().join("AI Generated"), "").unwrap();
        let tool = WriteToVaultTool::new(dir.path().to_path_buf());

        let result = tool
            .execute(&json!({"file_name": "note.md", "content": "x"}))
            .await;
        assert!(matches!(result, Err(ChatError::ToolError(_))));
    }
}
