use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored unit of source code plus metadata: the atomic object of retrieval.
///
/// `code_id` is unique across the corpus. Once admitted the source text is
/// immutable; updates replace the whole entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub code_id: String,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: SnippetKind,
    pub language: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Ordered, deduplicated module names imported by the snippet.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnippetKind {
    Function,
    Class,
    #[default]
    Unspecified,
}

/// Raw candidate snippet submitted for admission.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmitRequest {
    /// Optional externally assigned identifier; a fresh one is assigned
    /// when absent.
    pub code_id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: SnippetKind,
    pub language: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmitResponse {
    pub code_id: String,
    pub dependencies: Vec<String>,
}

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Equality filter on the snippet language tag
    pub language: Option<String>,
    /// Exact-match filter on the enriched dependency list
    pub dependency: Option<String>,
    /// Equality filter on the origin repository name
    pub repo_name: Option<String>,
    /// Generate reuse guidance for the top results
    #[serde(default)]
    pub explain: bool,
    #[serde(default = "default_explain_top_n")]
    pub explain_top_n: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_explain_top_n() -> usize {
    3
}

/// A single ranked search hit, enriched where possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub code_id: String,
    /// Similarity in (0, 1], computed as 1 / (1 + distance)
    pub score: f32,
    /// Raw index distance, preserved for diagnostics
    pub distance: f32,
    pub code: String,
    pub name: Option<String>,
    pub kind: SnippetKind,
    pub language: String,
    pub file_path: Option<String>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    /// Populated only when relationship enrichment succeeds
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Identifiers of related snippets from the relationship store
    #[serde(default)]
    pub related: Vec<String>,
    /// Generated reuse guidance, when requested and generation succeeded
    #[serde(default)]
    pub narrative: Option<String>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub results: Vec<SearchResult>,
}

/// Corpus-wide statistics aggregate.
///
/// Assembly failures degrade to `Stats::default()` so the endpoint always
/// produces a structurally valid response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_snippets: u64,
    pub total_libraries: u64,
    pub total_languages: u64,
    pub language_distribution: HashMap<String, u64>,
    pub repo_distribution: HashMap<String, u64>,
    pub top_dependencies: HashMap<String, u64>,
    /// Entity count reported by the vector index
    pub indexed_vectors: u64,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}
