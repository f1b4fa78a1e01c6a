//! Milvus RESTful v2 client for the snippet vector index.
//!
//! One collection holds the embedding plus the denormalized snippet fields
//! needed for display. Distances are L2; score normalization happens in the
//! orchestrator, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VectorConfig;
use crate::models::{CodeSnippet, SnippetKind};
use crate::services::{VectorHit, VectorIndex};

// VARCHAR caps from the collection schema.
const MAX_CODE_ID_LEN: usize = 255;
const MAX_CODE_LEN: usize = 65_535;
const MAX_NAME_LEN: usize = 255;
const MAX_KIND_LEN: usize = 50;
const MAX_LANGUAGE_LEN: usize = 50;
const MAX_PATH_LEN: usize = 512;
const MAX_REPO_NAME_LEN: usize = 255;
const MAX_REPO_URL_LEN: usize = 512;

pub struct MilvusClient {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    dimension: usize,
}

impl MilvusClient {
    pub fn new(http: reqwest::Client, config: &VectorConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dimension: config.dimension,
        }
    }

    fn url(&self, op: &str) -> String {
        format!("{}/v2/vectordb/{op}", self.base_url)
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        op: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(self.url(op))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Milvus {op}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Milvus {op} returned {status}: {body}");
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Milvus {op} response"))?;

        if envelope.code != 0 {
            anyhow::bail!(
                "Milvus {op} failed (code {}): {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            );
        }

        envelope
            .data
            .with_context(|| format!("Milvus {op} response had no data"))
    }
}

/// Standard `{code, message, data}` response envelope.
///
/// The explicit bound keeps `#[serde(default)]` on `data` from requiring
/// `T: Default`; the `Option` already defaults to `None`.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest {
    collection_name: String,
    data: Vec<SnippetRow>,
}

#[derive(Serialize, Deserialize)]
struct SnippetRow {
    code_id: String,
    code: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    language: String,
    file_path: String,
    repo_name: String,
    repo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    /// Present on search hits only
    #[serde(default)]
    distance: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    collection_name: String,
    data: Vec<Vec<f32>>,
    anns_field: String,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    output_fields: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    collection_name: String,
    filter: String,
    output_fields: Vec<String>,
    limit: usize,
    offset: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    collection_name: String,
    filter: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsRequest {
    collection_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsData {
    row_count: u64,
}

fn output_fields() -> Vec<String> {
    [
        "code_id",
        "code",
        "name",
        "type",
        "language",
        "file_path",
        "repo_name",
        "repo_url",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn key_filter(code_id: &str) -> String {
    format!("code_id == {}", super::quote_value(code_id))
}

/// Truncate on a char boundary at or below `max` bytes; VARCHAR fields in
/// the collection are byte-bounded.
fn clamp(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

fn to_row(snippet: &CodeSnippet, vector: Option<&[f32]>) -> SnippetRow {
    let kind = match snippet.kind {
        SnippetKind::Function => "function",
        SnippetKind::Class => "class",
        SnippetKind::Unspecified => "",
    };
    SnippetRow {
        code_id: clamp(&snippet.code_id, MAX_CODE_ID_LEN),
        code: clamp(&snippet.code, MAX_CODE_LEN),
        name: clamp(snippet.name.as_deref().unwrap_or_default(), MAX_NAME_LEN),
        kind: clamp(kind, MAX_KIND_LEN),
        language: clamp(&snippet.language, MAX_LANGUAGE_LEN),
        file_path: clamp(snippet.file_path.as_deref().unwrap_or_default(), MAX_PATH_LEN),
        repo_name: clamp(
            snippet.repo_name.as_deref().unwrap_or_default(),
            MAX_REPO_NAME_LEN,
        ),
        repo_url: clamp(snippet.repo_url.as_deref().unwrap_or_default(), MAX_REPO_URL_LEN),
        vector: vector.map(|v| v.to_vec()),
        distance: None,
    }
}

fn from_row(row: SnippetRow) -> CodeSnippet {
    let opt = |s: String| if s.is_empty() { None } else { Some(s) };
    CodeSnippet {
        code_id: row.code_id,
        code: row.code,
        name: opt(row.name),
        kind: match row.kind.as_str() {
            "function" => SnippetKind::Function,
            "class" => SnippetKind::Class,
            _ => SnippetKind::Unspecified,
        },
        language: row.language,
        file_path: opt(row.file_path),
        repo_name: opt(row.repo_name),
        repo_url: opt(row.repo_url),
        dependencies: Vec::new(),
    }
}

#[async_trait]
impl VectorIndex for MilvusClient {
    async fn insert(&self, snippets: &[CodeSnippet], vectors: &[Vec<f32>]) -> Result<()> {
        if snippets.len() != vectors.len() {
            anyhow::bail!(
                "Snippet count ({}) does not match vector count ({})",
                snippets.len(),
                vectors.len()
            );
        }
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                anyhow::bail!(
                    "Vector {i} has dimension {}, collection expects {}",
                    vector.len(),
                    self.dimension
                );
            }
        }
        if snippets.is_empty() {
            return Ok(());
        }

        let req = InsertRequest {
            collection_name: self.collection.clone(),
            data: snippets
                .iter()
                .zip(vectors)
                .map(|(s, v)| to_row(s, Some(v)))
                .collect(),
        };
        let _: Value = self.post("entities/insert", &req).await?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let req = SearchRequest {
            collection_name: self.collection.clone(),
            data: vec![vector.to_vec()],
            anns_field: "vector".to_string(),
            limit,
            filter: filter.map(|f| f.to_string()),
            output_fields: output_fields(),
        };
        let rows: Vec<SnippetRow> = self.post("entities/search", &req).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let distance = row.distance.unwrap_or(0.0);
                VectorHit {
                    distance,
                    snippet: from_row(row),
                }
            })
            .collect())
    }

    async fn get_by_key(&self, code_id: &str) -> Result<Option<CodeSnippet>> {
        let req = QueryRequest {
            collection_name: self.collection.clone(),
            filter: key_filter(code_id),
            output_fields: output_fields(),
            limit: 1,
            offset: 0,
        };
        let rows: Vec<SnippetRow> = self.post("entities/query", &req).await?;
        Ok(rows.into_iter().next().map(from_row))
    }

    async fn list(
        &self,
        offset: usize,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<CodeSnippet>> {
        let req = QueryRequest {
            collection_name: self.collection.clone(),
            // Milvus query requires a filter; an always-true predicate
            // pages the whole collection.
            filter: filter.unwrap_or("code_id != \"\"").to_string(),
            output_fields: output_fields(),
            limit,
            offset,
        };
        let rows: Vec<SnippetRow> = self.post("entities/query", &req).await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn delete_by_key(&self, code_id: &str) -> Result<bool> {
        // Milvus delete does not report how many rows matched.
        if self.get_by_key(code_id).await?.is_none() {
            return Ok(false);
        }
        let req = DeleteRequest {
            collection_name: self.collection.clone(),
            filter: key_filter(code_id),
        };
        let _: Value = self.post("entities/delete", &req).await?;
        Ok(true)
    }

    async fn entity_count(&self) -> Result<u64> {
        let req = StatsRequest {
            collection_name: self.collection.clone(),
        };
        let stats: StatsData = self.post("collections/get_stats", &req).await?;
        Ok(stats.row_count)
    }
}
