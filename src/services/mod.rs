//! External service boundaries.
//!
//! The orchestrator depends on these traits, never on concrete clients;
//! handles are constructed once at startup and injected (see
//! [`crate::state::AppState`]). Tests substitute in-memory fakes.

pub mod embedding;
pub mod llm;
pub mod milvus;
pub mod neo4j;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::CodeSnippet;

/// Quote a value for use in an index filter expression.
pub fn quote_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build the equality-conjunction filter expression understood by the
/// vector index: at most two clauses, over `language` and `repo_name`.
pub fn filter_expr(language: Option<&str>, repo_name: Option<&str>) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(language) = language {
        clauses.push(format!("language == {}", quote_value(language)));
    }
    if let Some(repo_name) = repo_name {
        clauses.push(format!("repo_name == {}", quote_value(repo_name)));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

/// A nearest-neighbor hit from the vector index, with its raw distance and
/// the denormalized snippet fields stored alongside the vector. The
/// dependency list is not stored in the index and is always empty here.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub distance: f32,
    pub snippet: CodeSnippet,
}

/// Nearest-neighbor index over snippet embeddings.
///
/// Filter expressions are simple equality conjunctions over `language` and
/// `repo_name`, e.g. `language == "python" and repo_name == "flask"`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert snippets with their embedding vectors, parallel by position.
    async fn insert(&self, snippets: &[CodeSnippet], vectors: &[Vec<f32>]) -> Result<()>;

    /// ANN search, hits ordered by ascending distance.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<VectorHit>>;

    /// Fetch one snippet's stored fields by identifier.
    async fn get_by_key(&self, code_id: &str) -> Result<Option<CodeSnippet>>;

    /// Page through stored snippets, optionally filtered.
    async fn list(
        &self,
        offset: usize,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<CodeSnippet>>;

    /// Delete by identifier. Returns false when the key was absent.
    async fn delete_by_key(&self, code_id: &str) -> Result<bool>;

    /// Total stored entity count.
    async fn entity_count(&self) -> Result<u64>;
}

/// Relational data attached to one snippet.
#[derive(Debug, Clone, Default)]
pub struct SnippetRelations {
    pub dependencies: Vec<String>,
    pub languages: Vec<String>,
    /// Identifiers of snippets linked as similar
    pub related: Vec<String>,
}

/// Aggregate node/edge counts from the relationship store.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphCounts {
    pub snippets: u64,
    pub libraries: u64,
    pub languages: u64,
}

/// Graph of snippets, the libraries they depend on, and the languages they
/// are written in.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert the snippet node and its DEPENDS_ON / WRITTEN_IN edges.
    async fn upsert_snippet(&self, snippet: &CodeSnippet) -> Result<()>;

    /// Enrichment lookup. `None` when the snippet node does not exist.
    async fn relations(&self, code_id: &str) -> Result<Option<SnippetRelations>>;

    /// Detach-delete the snippet node. Returns false when absent.
    async fn delete_snippet(&self, code_id: &str) -> Result<bool>;

    async fn counts(&self) -> Result<GraphCounts>;

    async fn language_distribution(&self) -> Result<HashMap<String, u64>>;

    /// Per-repository snippet counts, bounded to the top `limit`.
    async fn repo_distribution(&self, limit: usize) -> Result<HashMap<String, u64>>;

    /// Most-depended-on libraries, bounded to the top `limit`.
    async fn top_dependencies(&self, limit: usize) -> Result<HashMap<String, u64>>;
}

/// Text-to-vector encoder. Output dimension is fixed per deployment and
/// must match the vector index's configured dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Language-model endpoint used only for narrative augmentation; treated as
/// slow, rate-limited and fallible.
#[async_trait]
pub trait NarrativeModel: Send + Sync {
    /// Generate reuse guidance for one snippet in the context of the query.
    async fn reuse_guidance(
        &self,
        code: &str,
        language: &str,
        dependencies: &[String],
        query: &str,
    ) -> Result<String>;
}
