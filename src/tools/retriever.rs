//! Note retrieval
//!
//! `Retriever` is the seam where a vector index plugs in. `VaultScanRetriever`
//! needs no index: it scans the vault's markdown files for query terms.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A retrieved note, identified by its path relative to the vault
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub source: String,
    pub score: f32,
}

#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Best `k` hits for `query`, highest score first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>>;
}

/// Term-overlap search over `*.md` files
pub struct VaultScanRetriever {
    vault_path: PathBuf,
}

impl VaultScanRetriever {
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            vault_path: vault_path.into(),
        }
    }

    fn query_terms(query: &str) -> BTreeSet<String> {
        query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| term.chars().count() >= 2)
            .map(str::to_lowercase)
            .collect()
    }

    /// All markdown files below the vault, skipping hidden directories
    async fn markdown_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.vault_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                let file_type = entry.file_type().await?;

                if file_type.is_dir() && !hidden {
                    pending.push(path);
                } else if file_type.is_file()
                    && path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("md"))
                {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    fn relative_source(&self, path: &Path) -> String {
        path.strip_prefix(&self.vault_path)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait::async_trait]
impl Retriever for VaultScanRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        let terms = Self::query_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for path in self.markdown_files().await? {
            let Ok(text) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let haystack = text.to_lowercase();
            let matched = terms.iter().filter(|term| haystack.contains(term.as_str())).count();
            if matched == 0 {
                continue;
            }

            hits.push(RetrievalHit {
                source: self.relative_source(&path),
                score: matched as f32 / terms.len() as f32,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
        });
        hits.truncate(k);

        debug!(query, hits = hits.len(), "Vault scan finished");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn vault() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Projects")).unwrap();
        fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        fs::write(dir.path().join("garden.md"), "Tomatoes and basil in the garden").unwrap();
        fs::write(
            dir.path().join("Projects").join("rust.md"),
            "Rust garden crate notes",
        )
        .unwrap();
        fs::write(dir.path().join(".obsidian").join("garden.md"), "garden config").unwrap();
        fs::write(dir.path().join("todo.txt"), "garden").unwrap();
        dir
    }

    #[test]
    fn test_query_terms() {
        let terms = VaultScanRetriever::query_terms("What's in my Garden? a b");
        assert!(terms.contains("garden"));
        assert!(terms.contains("what"));
        assert!(!terms.contains("a"));
    }

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let dir = vault();
        let retriever = VaultScanRetriever::new(dir.path());

        let hits = retriever.search("rust garden", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "Projects/rust.md");
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].source, "garden.md");
    }

    #[tokio::test]
    async fn test_search_respects_k_and_empty_query() {
        let dir = vault();
        let retriever = VaultScanRetriever::new(dir.path());

        assert_eq!(retriever.search("garden", 1).await.unwrap().len(), 1);
        assert!(retriever.search("?", 10).await.unwrap().is_empty());
        assert!(retriever.search("zebra", 10).await.unwrap().is_empty());
    }
}
