use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::ingest::{dedupe_batch, extract_dependencies, Language, QualityGate, RejectReason};
use crate::models::{
    AdmitRequest, CodeSnippet, SearchRequest, SearchResponse, SearchResult, Stats,
};
use crate::services::{filter_expr, Embedder, GraphStore, NarrativeModel, VectorIndex};

/// Over-fetch factor applied when a dependency filter is present: the
/// filter is evaluated post-hoc against graph enrichment, so the index
/// is asked for more candidates than the caller wants back.
const DEPENDENCY_OVERSAMPLE: usize = 3;

/// How many entries the ranked distributions in `Stats` carry.
const DISTRIBUTION_LIMIT: usize = 10;

const STATS_CACHE_KEY: &str = "stats";

/// Per-item result of a batch admission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdmitOutcome {
    Admitted {
        code_id: String,
        dependencies: Vec<String>,
    },
    Rejected {
        reason: String,
    },
    /// Content-identical to an earlier snippet in the same batch.
    Duplicate {
        code_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The identifier was absent from both stores.
    NotFound,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(CodeSnippet),
    NotFound,
    /// The replacement content failed the quality gate.
    Rejected(RejectReason),
}

/// Orchestrates retrieval and corpus mutation across the vector index,
/// the relationship store, and the generation models.
///
/// All backends are reached through trait objects so tests can swap in
/// in-memory fakes. The narrative model is optional; without one,
/// `explain` requests degrade to results without narratives.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    narrator: Option<Arc<dyn NarrativeModel>>,
    gate: QualityGate,
    stats_cache: TtlCache<Stats>,
    stats_ttl: Duration,
}

impl Retriever {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        narrator: Option<Arc<dyn NarrativeModel>>,
    ) -> Self {
        Self {
            embedder,
            index,
            graph,
            narrator,
            gate: QualityGate::new(&config.gate),
            stats_cache: TtlCache::new(),
            stats_ttl: Duration::from_secs(config.stats_ttl_secs),
        }
    }

    /// Run a retrieval request end to end.
    ///
    /// The query embedding and the index search are load-bearing: their
    /// failure fails the request. Graph enrichment is best-effort unless a
    /// dependency filter is present, in which case an unenrichable candidate
    /// cannot be verified and is dropped. Narrative generation never affects
    /// which results are returned or their order.
    pub async fn search(&self, req: &SearchRequest) -> Result<SearchResponse> {
        if req.query.trim().is_empty() {
            bail!("query must not be empty");
        }
        if req.top_k == 0 {
            bail!("top_k must be at least 1");
        }

        let vector = self
            .embedder
            .encode(&req.query)
            .await
            .context("failed to embed query")?;

        let filter = filter_expr(req.language.as_deref(), req.repo_name.as_deref());
        let fetch_limit = if req.dependency.is_some() {
            req.top_k.saturating_mul(DEPENDENCY_OVERSAMPLE)
        } else {
            req.top_k
        };

        let hits = self
            .index
            .search(&vector, fetch_limit, filter.as_deref())
            .await
            .context("vector search failed")?;

        let mut results: Vec<SearchResult> = Vec::with_capacity(req.top_k.min(hits.len()));
        for hit in hits {
            if results.len() == req.top_k {
                break;
            }

            let snippet = hit.snippet;
            let (dependencies, related) = match self.graph.relations(&snippet.code_id).await {
                Ok(Some(rel)) => (rel.dependencies, rel.related),
                Ok(None) => (Vec::new(), Vec::new()),
                Err(err) => {
                    tracing::warn!(
                        code_id = %snippet.code_id,
                        "relationship lookup failed: {err:#}"
                    );
                    if req.dependency.is_some() {
                        // Cannot verify the dependency filter for this
                        // candidate, so it does not qualify.
                        continue;
                    }
                    (Vec::new(), Vec::new())
                }
            };

            if let Some(dep) = &req.dependency {
                if !dependencies.contains(dep) {
                    continue;
                }
            }

            results.push(SearchResult {
                code_id: snippet.code_id,
                score: similarity(hit.distance),
                distance: hit.distance,
                code: snippet.code,
                name: snippet.name,
                kind: snippet.kind,
                language: snippet.language,
                file_path: snippet.file_path,
                repo_name: snippet.repo_name,
                repo_url: snippet.repo_url,
                dependencies,
                related,
                narrative: None,
            });
        }

        if req.explain {
            self.attach_narratives(&req.query, req.explain_top_n, &mut results)
                .await;
        }

        Ok(SearchResponse {
            query: req.query.clone(),
            top_k: req.top_k,
            results,
        })
    }

    /// Generate reuse guidance for the leading results, in place.
    ///
    /// Each generation is isolated: one failure leaves that result's
    /// narrative unset and moves on to the next.
    async fn attach_narratives(&self, query: &str, top_n: usize, results: &mut [SearchResult]) {
        let Some(narrator) = &self.narrator else {
            tracing::warn!("narrative model unavailable, returning results without narratives");
            return;
        };

        let n = top_n.min(results.len());
        for result in results.iter_mut().take(n) {
            match narrator
                .reuse_guidance(&result.code, &result.language, &result.dependencies, query)
                .await
            {
                Ok(text) => result.narrative = Some(text),
                Err(err) => {
                    tracing::warn!(
                        code_id = %result.code_id,
                        "narrative generation failed: {err:#}"
                    );
                }
            }
        }
    }

    /// Admit a batch of raw snippets: quality gate, dependency extraction,
    /// batch-local dedup, then persistence to both stores.
    ///
    /// Gate rejections and duplicates are reported per item; persistence
    /// failures fail the whole batch since embeddings and inserts run over
    /// the surviving snippets together.
    pub async fn admit_batch(&self, batch: Vec<AdmitRequest>) -> Result<Vec<AdmitOutcome>> {
        let mut slots: Vec<Option<AdmitOutcome>> = Vec::with_capacity(batch.len());
        let mut admitted: Vec<CodeSnippet> = Vec::new();

        for req in batch {
            match self.gate.admit(&req.code) {
                Err(reason) => slots.push(Some(AdmitOutcome::Rejected {
                    reason: reason.to_string(),
                })),
                Ok(code) => {
                    let code_id = req
                        .code_id
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let dependencies =
                        extract_dependencies(&code, Language::from_tag(&req.language));
                    admitted.push(CodeSnippet {
                        code_id,
                        code,
                        name: req.name,
                        kind: req.kind,
                        language: req.language,
                        file_path: req.file_path,
                        repo_name: req.repo_name,
                        repo_url: req.repo_url,
                        dependencies,
                    });
                    slots.push(None);
                }
            }
        }

        let unique = dedupe_batch(admitted.clone());
        if !unique.is_empty() {
            self.persist(&unique).await?;
            self.stats_cache.delete(STATS_CACHE_KEY);
        }

        let kept: std::collections::HashSet<&str> =
            unique.iter().map(|s| s.code_id.as_str()).collect();
        // Gate-passing inputs and `admitted` line up by construction.
        let mut admitted_iter = admitted.into_iter();
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    let Some(snippet) = admitted_iter.next() else {
                        break;
                    };
                    if kept.contains(snippet.code_id.as_str()) {
                        outcomes.push(AdmitOutcome::Admitted {
                            code_id: snippet.code_id,
                            dependencies: snippet.dependencies,
                        });
                    } else {
                        outcomes.push(AdmitOutcome::Duplicate {
                            code_id: snippet.code_id,
                        });
                    }
                }
            }
        }

        Ok(outcomes)
    }

    async fn persist(&self, snippets: &[CodeSnippet]) -> Result<()> {
        let texts: Vec<String> = snippets.iter().map(|s| s.code.clone()).collect();
        let vectors = self
            .embedder
            .encode_batch(&texts)
            .await
            .context("failed to embed admitted snippets")?;

        self.index
            .insert(snippets, &vectors)
            .await
            .context("vector index insert failed")?;

        for snippet in snippets {
            self.graph.upsert_snippet(snippet).await.with_context(|| {
                format!(
                    "snippet {} was indexed but the relationship upsert failed, stores are inconsistent",
                    snippet.code_id
                )
            })?;
        }

        Ok(())
    }

    /// Fetch one snippet by identifier, with best-effort graph enrichment.
    pub async fn get(&self, code_id: &str) -> Result<Option<CodeSnippet>> {
        let Some(mut snippet) = self.index.get_by_key(code_id).await? else {
            return Ok(None);
        };

        match self.graph.relations(code_id).await {
            Ok(Some(rel)) => snippet.dependencies = rel.dependencies,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(code_id = %code_id, "relationship lookup failed: {err:#}");
            }
        }

        Ok(Some(snippet))
    }

    /// Page through stored snippets.
    pub async fn list(
        &self,
        offset: usize,
        limit: usize,
        language: Option<&str>,
        repo_name: Option<&str>,
    ) -> Result<Vec<CodeSnippet>> {
        let filter = filter_expr(language, repo_name);
        self.index.list(offset, limit, filter.as_deref()).await
    }

    /// Replace a stored snippet wholesale. The new content passes through
    /// the same gate and dependency extraction as admission.
    pub async fn update(&self, code_id: &str, req: AdmitRequest) -> Result<UpdateOutcome> {
        if self.index.get_by_key(code_id).await?.is_none() {
            return Ok(UpdateOutcome::NotFound);
        }

        let code = match self.gate.admit(&req.code) {
            Ok(code) => code,
            Err(reason) => return Ok(UpdateOutcome::Rejected(reason)),
        };
        let dependencies = extract_dependencies(&code, Language::from_tag(&req.language));
        let snippet = CodeSnippet {
            code_id: code_id.to_string(),
            code,
            name: req.name,
            kind: req.kind,
            language: req.language,
            file_path: req.file_path,
            repo_name: req.repo_name,
            repo_url: req.repo_url,
            dependencies,
        };

        self.index
            .delete_by_key(code_id)
            .await
            .context("failed to remove previous version from the vector index")?;
        // Detach-delete the graph node too: upserts merge edges, so leaving
        // the old node in place would keep dependency edges the replacement
        // no longer has.
        self.graph
            .delete_snippet(code_id)
            .await
            .context("failed to remove previous version from the relationship store")?;
        self.persist(std::slice::from_ref(&snippet)).await?;
        self.stats_cache.delete(STATS_CACHE_KEY);

        Ok(UpdateOutcome::Updated(snippet))
    }

    /// Delete a snippet from both stores.
    ///
    /// `NotFound` only when neither store held the identifier. A failure
    /// after the vector delete succeeded is surfaced as an error so the
    /// caller knows the stores may disagree.
    pub async fn delete(&self, code_id: &str) -> Result<DeleteOutcome> {
        let in_index = self
            .index
            .delete_by_key(code_id)
            .await
            .context("vector index delete failed")?;

        let in_graph = self.graph.delete_snippet(code_id).await.with_context(|| {
            if in_index {
                format!(
                    "snippet {code_id} was removed from the vector index but the relationship delete failed, stores are inconsistent"
                )
            } else {
                format!("relationship delete failed for snippet {code_id}")
            }
        })?;

        if !in_index && !in_graph {
            return Ok(DeleteOutcome::NotFound);
        }

        self.stats_cache.delete(STATS_CACHE_KEY);
        Ok(DeleteOutcome::Deleted)
    }

    /// Corpus statistics, served from a short-TTL cache.
    ///
    /// Any failure while assembling fresh numbers degrades to the zero-value
    /// aggregate; the degraded value is not cached, so the next call retries.
    pub async fn statistics(&self) -> Stats {
        if let Some(stats) = self.stats_cache.get(STATS_CACHE_KEY) {
            return stats;
        }

        match self.assemble_stats().await {
            Ok(stats) => {
                self.stats_cache
                    .set(STATS_CACHE_KEY, stats.clone(), self.stats_ttl);
                stats
            }
            Err(err) => {
                tracing::warn!("statistics assembly failed, returning empty aggregate: {err:#}");
                Stats::default()
            }
        }
    }

    async fn assemble_stats(&self) -> Result<Stats> {
        let counts = self.graph.counts().await?;
        let language_distribution = self.graph.language_distribution().await?;
        let repo_distribution = self.graph.repo_distribution(DISTRIBUTION_LIMIT).await?;
        let top_dependencies = self.graph.top_dependencies(DISTRIBUTION_LIMIT).await?;
        let indexed_vectors = self.index.entity_count().await?;

        Ok(Stats {
            total_snippets: counts.snippets,
            total_libraries: counts.libraries,
            total_languages: counts.languages,
            language_distribution,
            repo_distribution,
            top_dependencies,
            indexed_vectors,
            generated_at: Some(chrono::Utc::now()),
        })
    }
}

/// Map an index distance in [0, ∞) onto a similarity score in (0, 1].
fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}
