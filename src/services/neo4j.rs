//! Neo4j relationship store client, speaking the transactional Cypher HTTP
//! endpoint (`/db/{name}/tx/commit`).
//!
//! Nodes: `CodeSnippet` (keyed by `code_id`), `Library`, `Language`.
//! Edges: `DEPENDS_ON` (snippet→library), `WRITTEN_IN` (snippet→language),
//! `SIMILAR_TO` (snippet→snippet, read-only here).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::GraphConfig;
use crate::models::{CodeSnippet, SnippetKind};
use crate::services::{GraphCounts, GraphStore, SnippetRelations};

pub struct Neo4jClient {
    http: reqwest::Client,
    commit_url: String,
    user: String,
    password: Option<String>,
}

#[derive(Serialize)]
struct TxRequest {
    statements: Vec<Statement>,
}

#[derive(Serialize)]
struct Statement {
    statement: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jClient {
    pub fn new(http: reqwest::Client, config: &GraphConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            http,
            commit_url: format!("{base}/db/{}/tx/commit", config.database),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    /// Run statements in one auto-committed transaction, returning one
    /// result per statement.
    async fn commit(&self, statements: Vec<Statement>) -> Result<Vec<TxResult>> {
        let resp = self
            .http
            .post(&self.commit_url)
            .basic_auth(&self.user, self.password.as_deref())
            .json(&TxRequest { statements })
            .send()
            .await
            .context("Failed to call Neo4j transaction endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Neo4j returned {status}: {body}");
        }

        let body: TxResponse = resp
            .json()
            .await
            .context("Failed to parse Neo4j transaction response")?;

        if let Some(err) = body.errors.first() {
            anyhow::bail!("Neo4j query failed ({}): {}", err.code, err.message);
        }

        Ok(body.results)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn single_count(result: Option<&TxResult>) -> u64 {
    result
        .and_then(|r| r.data.first())
        .and_then(|row| row.row.first())
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn distribution(result: Option<&TxResult>) -> HashMap<String, u64> {
    let mut map = HashMap::new();
    if let Some(result) = result {
        for row in &result.data {
            if let (Some(name), Some(count)) = (
                row.row.first().and_then(Value::as_str),
                row.row.get(1).and_then(Value::as_u64),
            ) {
                map.insert(name.to_string(), count);
            }
        }
    }
    map
}

#[async_trait]
impl GraphStore for Neo4jClient {
    async fn upsert_snippet(&self, snippet: &CodeSnippet) -> Result<()> {
        let kind = match snippet.kind {
            SnippetKind::Function => "function",
            SnippetKind::Class => "class",
            SnippetKind::Unspecified => "",
        };

        let mut statements = vec![Statement {
            statement: "MERGE (c:CodeSnippet {code_id: $code_id}) \
                        SET c.name = $name, c.type = $kind, c.language = $language, \
                        c.file_path = $file_path, c.repo_name = $repo_name, \
                        c.repo_url = $repo_url"
                .to_string(),
            parameters: json!({
                "code_id": snippet.code_id,
                "name": snippet.name,
                "kind": kind,
                "language": snippet.language,
                "file_path": snippet.file_path,
                "repo_name": snippet.repo_name,
                "repo_url": snippet.repo_url,
            }),
        }];

        if !snippet.dependencies.is_empty() {
            statements.push(Statement {
                statement: "MATCH (c:CodeSnippet {code_id: $code_id}) \
                            UNWIND $deps AS dep \
                            MERGE (d:Library {name: dep}) \
                            MERGE (c)-[:DEPENDS_ON]->(d)"
                    .to_string(),
                parameters: json!({
                    "code_id": snippet.code_id,
                    "deps": snippet.dependencies,
                }),
            });
        }

        statements.push(Statement {
            statement: "MATCH (c:CodeSnippet {code_id: $code_id}) \
                        MERGE (l:Language {name: $language}) \
                        MERGE (c)-[:WRITTEN_IN]->(l)"
                .to_string(),
            parameters: json!({
                "code_id": snippet.code_id,
                "language": snippet.language,
            }),
        });

        self.commit(statements).await?;
        Ok(())
    }

    async fn relations(&self, code_id: &str) -> Result<Option<SnippetRelations>> {
        let results = self
            .commit(vec![Statement {
                statement: "MATCH (c:CodeSnippet {code_id: $code_id}) \
                            OPTIONAL MATCH (c)-[:DEPENDS_ON]->(d:Library) \
                            OPTIONAL MATCH (c)-[:WRITTEN_IN]->(l:Language) \
                            OPTIONAL MATCH (c)-[:SIMILAR_TO]->(s:CodeSnippet) \
                            RETURN collect(DISTINCT d.name), \
                                   collect(DISTINCT l.name), \
                                   collect(DISTINCT s.code_id)"
                    .to_string(),
                parameters: json!({ "code_id": code_id }),
            }])
            .await?;

        let row = match results.first().and_then(|r| r.data.first()) {
            Some(row) => row,
            None => return Ok(None),
        };

        Ok(Some(SnippetRelations {
            dependencies: string_list(row.row.first()),
            languages: string_list(row.row.get(1)),
            related: string_list(row.row.get(2)),
        }))
    }

    async fn delete_snippet(&self, code_id: &str) -> Result<bool> {
        let results = self
            .commit(vec![Statement {
                statement: "OPTIONAL MATCH (c:CodeSnippet {code_id: $code_id}) \
                            DETACH DELETE c RETURN count(c)"
                    .to_string(),
                parameters: json!({ "code_id": code_id }),
            }])
            .await?;
        Ok(single_count(results.first()) > 0)
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let results = self
            .commit(vec![
                Statement {
                    statement: "MATCH (c:CodeSnippet) RETURN count(c)".to_string(),
                    parameters: json!({}),
                },
                Statement {
                    statement: "MATCH (d:Library) RETURN count(d)".to_string(),
                    parameters: json!({}),
                },
                Statement {
                    statement: "MATCH (l:Language) RETURN count(l)".to_string(),
                    parameters: json!({}),
                },
            ])
            .await?;

        Ok(GraphCounts {
            snippets: single_count(results.first()),
            libraries: single_count(results.get(1)),
            languages: single_count(results.get(2)),
        })
    }

    async fn language_distribution(&self) -> Result<HashMap<String, u64>> {
        let results = self
            .commit(vec![Statement {
                statement: "MATCH (c:CodeSnippet)-[:WRITTEN_IN]->(l:Language) \
                            RETURN l.name, count(c)"
                    .to_string(),
                parameters: json!({}),
            }])
            .await?;
        Ok(distribution(results.first()))
    }

    async fn repo_distribution(&self, limit: usize) -> Result<HashMap<String, u64>> {
        let results = self
            .commit(vec![Statement {
                statement: "MATCH (c:CodeSnippet) \
                            WHERE c.repo_name IS NOT NULL AND c.repo_name <> '' \
                            RETURN c.repo_name, count(c) AS n \
                            ORDER BY n DESC LIMIT $limit"
                    .to_string(),
                parameters: json!({ "limit": limit }),
            }])
            .await?;
        Ok(distribution(results.first()))
    }

    async fn top_dependencies(&self, limit: usize) -> Result<HashMap<String, u64>> {
        let results = self
            .commit(vec![Statement {
                statement: "MATCH (:CodeSnippet)-[:DEPENDS_ON]->(d:Library) \
                            RETURN d.name, count(*) AS n \
                            ORDER BY n DESC LIMIT $limit"
                    .to_string(),
                parameters: json!({ "limit": limit }),
            }])
            .await?;
        Ok(distribution(results.first()))
    }
}
