//! Integration tests for the retrieval and admission pipelines.
//!
//! The orchestrator is exercised against in-memory fakes for the vector
//! index, relationship store, embedder, and narrative model, so no
//! external services are required.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use snippet_search::config::Config;
use snippet_search::models::{AdmitRequest, CodeSnippet, SearchRequest, SnippetKind};
use snippet_search::search::{AdmitOutcome, DeleteOutcome, Retriever, UpdateOutcome};
use snippet_search::services::{
    Embedder, GraphCounts, GraphStore, NarrativeModel, SnippetRelations, VectorHit, VectorIndex,
};

// ── Fakes ────────────────────────────────────────────────────────

struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0, 0.0, 0.0])
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0, 0.0, 0.0])
            .collect())
    }
}

#[derive(Default)]
struct FakeIndex {
    stored: Mutex<HashMap<String, CodeSnippet>>,
    /// Hits returned by `search`, in ranked order.
    search_hits: Mutex<Vec<VectorHit>>,
    last_search_limit: AtomicUsize,
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn insert(&self, snippets: &[CodeSnippet], vectors: &[Vec<f32>]) -> Result<()> {
        assert_eq!(snippets.len(), vectors.len());
        let mut stored = self.stored.lock();
        for snippet in snippets {
            stored.insert(snippet.code_id.clone(), snippet.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        _vector: &[f32],
        limit: usize,
        _filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        self.last_search_limit.store(limit, Ordering::SeqCst);
        let hits = self.search_hits.lock().clone();
        Ok(hits.into_iter().take(limit).collect())
    }

    async fn get_by_key(&self, code_id: &str) -> Result<Option<CodeSnippet>> {
        Ok(self.stored.lock().get(code_id).cloned())
    }

    async fn list(
        &self,
        offset: usize,
        limit: usize,
        _filter: Option<&str>,
    ) -> Result<Vec<CodeSnippet>> {
        let stored = self.stored.lock();
        let mut all: Vec<CodeSnippet> = stored.values().cloned().collect();
        all.sort_by(|a, b| a.code_id.cmp(&b.code_id));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_by_key(&self, code_id: &str) -> Result<bool> {
        Ok(self.stored.lock().remove(code_id).is_some())
    }

    async fn entity_count(&self) -> Result<u64> {
        Ok(self.stored.lock().len() as u64)
    }
}

#[derive(Default)]
struct FakeGraph {
    relations: Mutex<HashMap<String, SnippetRelations>>,
    upserted: Mutex<HashMap<String, CodeSnippet>>,
    /// Snippet ids for which `relations` fails.
    failing: Mutex<HashSet<String>>,
    counts_calls: AtomicUsize,
    fail_counts: AtomicBool,
}

impl FakeGraph {
    fn set_relations(&self, code_id: &str, dependencies: &[&str]) {
        self.relations.lock().insert(
            code_id.to_string(),
            SnippetRelations {
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                languages: vec!["python".to_string()],
                related: Vec::new(),
            },
        );
    }

    fn fail_relations_for(&self, code_id: &str) {
        self.failing.lock().insert(code_id.to_string());
    }
}

#[async_trait]
impl GraphStore for FakeGraph {
    async fn upsert_snippet(&self, snippet: &CodeSnippet) -> Result<()> {
        self.upserted
            .lock()
            .insert(snippet.code_id.clone(), snippet.clone());
        // MERGE semantics: edges accumulate across upserts of the same node,
        // they are never removed here.
        let mut relations = self.relations.lock();
        let entry = relations
            .entry(snippet.code_id.clone())
            .or_insert_with(SnippetRelations::default);
        for dep in &snippet.dependencies {
            if !entry.dependencies.contains(dep) {
                entry.dependencies.push(dep.clone());
            }
        }
        if !entry.languages.contains(&snippet.language) {
            entry.languages.push(snippet.language.clone());
        }
        Ok(())
    }

    async fn relations(&self, code_id: &str) -> Result<Option<SnippetRelations>> {
        if self.failing.lock().contains(code_id) {
            bail!("relationship store unavailable");
        }
        Ok(self.relations.lock().get(code_id).cloned())
    }

    async fn delete_snippet(&self, code_id: &str) -> Result<bool> {
        let in_upserted = self.upserted.lock().remove(code_id).is_some();
        let in_relations = self.relations.lock().remove(code_id).is_some();
        Ok(in_upserted || in_relations)
    }

    async fn counts(&self) -> Result<GraphCounts> {
        self.counts_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_counts.load(Ordering::SeqCst) {
            bail!("relationship store unavailable");
        }
        Ok(GraphCounts {
            snippets: self.upserted.lock().len() as u64,
            libraries: 0,
            languages: 0,
        })
    }

    async fn language_distribution(&self) -> Result<HashMap<String, u64>> {
        Ok(HashMap::new())
    }

    async fn repo_distribution(&self, _limit: usize) -> Result<HashMap<String, u64>> {
        Ok(HashMap::new())
    }

    async fn top_dependencies(&self, _limit: usize) -> Result<HashMap<String, u64>> {
        Ok(HashMap::new())
    }
}

/// Fails for snippets whose code contains "broken".
struct FakeNarrator;

#[async_trait]
impl NarrativeModel for FakeNarrator {
    async fn reuse_guidance(
        &self,
        code: &str,
        _language: &str,
        _dependencies: &[String],
        query: &str,
    ) -> Result<String> {
        if code.contains("broken") {
            bail!("generation timed out");
        }
        Ok(format!("Adapt this snippet for: {query}"))
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn retriever(
    index: Arc<FakeIndex>,
    graph: Arc<FakeGraph>,
    with_narrator: bool,
) -> Retriever {
    let narrator: Option<Arc<dyn NarrativeModel>> = if with_narrator {
        Some(Arc::new(FakeNarrator))
    } else {
        None
    };
    Retriever::new(
        &Config::default(),
        Arc::new(FakeEmbedder),
        index,
        graph,
        narrator,
    )
}

fn snippet(id: &str, code: &str) -> CodeSnippet {
    CodeSnippet {
        code_id: id.to_string(),
        code: code.to_string(),
        name: None,
        kind: SnippetKind::Function,
        language: "python".to_string(),
        file_path: None,
        repo_name: None,
        repo_url: None,
        dependencies: Vec::new(),
    }
}

fn hit(id: &str, distance: f32) -> VectorHit {
    VectorHit {
        distance,
        snippet: snippet(id, "def handler(request):\n    return request"),
    }
}

fn query(text: &str, top_k: usize) -> SearchRequest {
    SearchRequest {
        query: text.to_string(),
        top_k,
        language: None,
        dependency: None,
        repo_name: None,
        explain: false,
        explain_top_n: 3,
    }
}

/// A snippet that clears the default admission gate (5 non-empty lines).
fn flask_handler() -> AdmitRequest {
    AdmitRequest {
        code_id: None,
        code: "import flask\n\ndef handler(request):\n    payload = request.get_json()\n    result = flask.jsonify(payload)\n    status = 200\n    return result, status".to_string(),
        name: Some("handler".to_string()),
        kind: SnippetKind::Function,
        language: "python".to_string(),
        file_path: Some("app/handler.py".to_string()),
        repo_name: Some("flask-app".to_string()),
        repo_url: None,
    }
}

// ── Search ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_orders_by_similarity() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![
        hit("a", 0.0),
        hit("b", 0.5),
        hit("c", 1.0),
        hit("d", 2.0),
        hit("e", 4.0),
        hit("f", 9.0),
    ];

    let r = retriever(index.clone(), graph, false);
    let response = r.search(&query("parse json payload", 5)).await.unwrap();

    assert_eq!(response.results.len(), 5);
    assert_eq!(response.results[0].code_id, "a");
    assert_eq!(response.results[0].score, 1.0);
    for pair in response.results.windows(2) {
        assert!(pair[0].score > pair[1].score);
    }
    for result in &response.results {
        assert!(result.score > 0.0 && result.score <= 1.0);
    }
    // No dependency filter: fetch exactly top_k.
    assert_eq!(index.last_search_limit.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let r = retriever(
        Arc::new(FakeIndex::default()),
        Arc::new(FakeGraph::default()),
        false,
    );
    assert!(r.search(&query("   ", 5)).await.is_err());
    assert!(r.search(&query("valid", 0)).await.is_err());
}

#[tokio::test]
async fn test_dependency_filter_oversamples_and_fails_closed() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![
        hit("a", 0.1),
        hit("b", 0.2),
        hit("c", 0.3),
        hit("d", 0.4),
    ];
    graph.set_relations("a", &["numpy"]);
    graph.fail_relations_for("b"); // unverifiable under a dependency filter
    graph.set_relations("c", &["flask", "requests"]);
    graph.set_relations("d", &["flask"]);

    let r = retriever(index.clone(), graph, false);
    let mut req = query("http handler", 2);
    req.dependency = Some("flask".to_string());
    let response = r.search(&req).await.unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.code_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "d"]);
    // 3× over-fetch when a dependency filter is present.
    assert_eq!(index.last_search_limit.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_enrichment_failure_keeps_result_without_filter() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![hit("a", 0.5)];
    graph.fail_relations_for("a");

    let r = retriever(index, graph, false);
    let response = r.search(&query("anything", 5)).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].dependencies.is_empty());
    assert!(response.results[0].related.is_empty());
    assert_eq!(response.results[0].score, 1.0 / 1.5);
}

#[tokio::test]
async fn test_huge_top_k_saturates_fetch_limit() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![hit("a", 0.1)];
    graph.set_relations("a", &["flask"]);

    let r = retriever(index.clone(), graph, false);
    let mut req = query("handler", usize::MAX);
    req.dependency = Some("flask".to_string());
    let response = r.search(&req).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(index.last_search_limit.load(Ordering::SeqCst), usize::MAX);
}

#[tokio::test]
async fn test_short_circuits_at_top_k() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![hit("a", 0.1), hit("b", 0.2), hit("c", 0.3)];
    for id in ["a", "b", "c"] {
        graph.set_relations(id, &["flask"]);
    }

    let r = retriever(index, graph, false);
    let mut req = query("handler", 2);
    req.dependency = Some("flask".to_string());
    let response = r.search(&req).await.unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.code_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

// ── Narratives ───────────────────────────────────────────────────

#[tokio::test]
async fn test_narrative_failure_is_isolated() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![
        VectorHit {
            distance: 0.1,
            snippet: snippet("a", "this one is broken"),
        },
        hit("b", 0.2),
    ];

    let r = retriever(index, graph, true);
    let mut req = query("handler", 5);
    req.explain = true;
    req.explain_top_n = 2;
    let response = r.search(&req).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(response.results[0].narrative.is_none());
    assert_eq!(
        response.results[1].narrative.as_deref(),
        Some("Adapt this snippet for: handler")
    );
}

#[tokio::test]
async fn test_explain_top_n_caps_narratives() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![hit("a", 0.1), hit("b", 0.2), hit("c", 0.3)];

    let r = retriever(index, graph, true);
    let mut req = query("handler", 5);
    req.explain = true;
    req.explain_top_n = 1;
    let response = r.search(&req).await.unwrap();

    assert!(response.results[0].narrative.is_some());
    assert!(response.results[1].narrative.is_none());
    assert!(response.results[2].narrative.is_none());
}

#[tokio::test]
async fn test_missing_narrator_degrades_gracefully() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    *index.search_hits.lock() = vec![hit("a", 0.1)];

    let r = retriever(index, graph, false);
    let mut req = query("handler", 5);
    req.explain = true;
    let response = r.search(&req).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].narrative.is_none());
}

// ── Admission ────────────────────────────────────────────────────

#[tokio::test]
async fn test_admit_batch_reports_per_item_outcomes() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index.clone(), graph.clone(), false);

    let good = flask_handler();
    let short = AdmitRequest {
        code: "x = 1\ny = 2".to_string(),
        ..flask_handler()
    };
    let duplicate = flask_handler();

    let outcomes = r.admit_batch(vec![good, short, duplicate]).await.unwrap();
    assert_eq!(outcomes.len(), 3);

    let AdmitOutcome::Admitted { dependencies, .. } = &outcomes[0] else {
        panic!("expected first item admitted, got {:?}", outcomes[0]);
    };
    assert_eq!(dependencies, &vec!["flask".to_string()]);
    assert!(matches!(&outcomes[1], AdmitOutcome::Rejected { .. }));
    assert!(matches!(&outcomes[2], AdmitOutcome::Duplicate { .. }));

    // Only the unique admitted snippet reached the stores.
    assert_eq!(index.stored.lock().len(), 1);
    assert_eq!(graph.upserted.lock().len(), 1);
}

#[tokio::test]
async fn test_admitted_snippet_is_retrievable_by_id() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph, false);

    let mut req = flask_handler();
    req.code_id = Some("snippet-1".to_string());
    let outcomes = r.admit_batch(vec![req]).await.unwrap();
    assert!(
        matches!(&outcomes[0], AdmitOutcome::Admitted { code_id, .. } if code_id.as_str() == "snippet-1")
    );

    let fetched = r.get("snippet-1").await.unwrap().unwrap();
    assert_eq!(fetched.dependencies, vec!["flask".to_string()]);
    assert!(r.get("no-such-id").await.unwrap().is_none());
}

// ── Update / delete ──────────────────────────────────────────────

#[tokio::test]
async fn test_update_replaces_content_and_dependencies() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph, false);

    let mut req = flask_handler();
    req.code_id = Some("snippet-1".to_string());
    r.admit_batch(vec![req]).await.unwrap();

    let replacement = AdmitRequest {
        code_id: None,
        code: "import requests\n\ndef fetch(url):\n    response = requests.get(url)\n    body = response.json()\n    return body".to_string(),
        ..flask_handler()
    };
    let outcome = r.update("snippet-1", replacement).await.unwrap();
    let UpdateOutcome::Updated(updated) = outcome else {
        panic!("expected update to succeed, got {outcome:?}");
    };
    assert_eq!(updated.code_id, "snippet-1");
    assert_eq!(updated.dependencies, vec!["requests".to_string()]);

    let fetched = r.get("snippet-1").await.unwrap().unwrap();
    assert!(fetched.code.contains("requests.get"));
}

#[tokio::test]
async fn test_update_removes_stale_dependency_edges() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index.clone(), graph, false);

    let mut req = flask_handler();
    req.code_id = Some("snippet-1".to_string());
    r.admit_batch(vec![req]).await.unwrap();

    let replacement = AdmitRequest {
        code_id: None,
        code: "import requests\n\ndef fetch(url):\n    response = requests.get(url)\n    body = response.json()\n    return body".to_string(),
        ..flask_handler()
    };
    r.update("snippet-1", replacement).await.unwrap();

    // Enrichment reflects only the replacement's imports.
    let fetched = r.get("snippet-1").await.unwrap().unwrap();
    assert_eq!(fetched.dependencies, vec!["requests".to_string()]);

    // A dependency filter on the old import no longer matches the snippet.
    *index.search_hits.lock() = vec![VectorHit {
        distance: 0.1,
        snippet: fetched,
    }];
    let mut search_req = query("http fetch", 5);
    search_req.dependency = Some("flask".to_string());
    let response = r.search(&search_req).await.unwrap();
    assert!(response.results.is_empty());

    search_req.dependency = Some("requests".to_string());
    let response = r.search(&search_req).await.unwrap();
    assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn test_update_unknown_id_and_rejected_content() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph, false);

    let outcome = r.update("missing", flask_handler()).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::NotFound));

    let mut req = flask_handler();
    req.code_id = Some("snippet-1".to_string());
    r.admit_batch(vec![req]).await.unwrap();

    let bad = AdmitRequest {
        code: "x = 1".to_string(),
        ..flask_handler()
    };
    let outcome = r.update("snippet-1", bad).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Rejected(_)));
}

#[tokio::test]
async fn test_delete_outcomes() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph, false);

    assert_eq!(
        r.delete("missing").await.unwrap(),
        DeleteOutcome::NotFound
    );

    let mut req = flask_handler();
    req.code_id = Some("snippet-1".to_string());
    r.admit_batch(vec![req]).await.unwrap();

    assert_eq!(r.delete("snippet-1").await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(
        r.delete("snippet-1").await.unwrap(),
        DeleteOutcome::NotFound
    );
}

// ── Statistics ───────────────────────────────────────────────────

#[tokio::test]
async fn test_stats_cached_and_invalidated_by_mutation() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph.clone(), false);

    let first = r.statistics().await;
    let second = r.statistics().await;
    assert_eq!(first.total_snippets, second.total_snippets);
    assert_eq!(graph.counts_calls.load(Ordering::SeqCst), 1);

    // A mutation invalidates the cache synchronously.
    r.admit_batch(vec![flask_handler()]).await.unwrap();
    let third = r.statistics().await;
    assert_eq!(graph.counts_calls.load(Ordering::SeqCst), 2);
    assert_eq!(third.total_snippets, 1);
    assert_eq!(third.indexed_vectors, 1);
    assert!(third.generated_at.is_some());
}

#[tokio::test]
async fn test_stats_failure_degrades_and_is_not_cached() {
    let index = Arc::new(FakeIndex::default());
    let graph = Arc::new(FakeGraph::default());
    let r = retriever(index, graph.clone(), false);

    graph.fail_counts.store(true, Ordering::SeqCst);
    let degraded = r.statistics().await;
    assert_eq!(degraded.total_snippets, 0);
    assert!(degraded.generated_at.is_none());

    // Recovery is immediate: the degraded aggregate was not cached.
    graph.fail_counts.store(false, Ordering::SeqCst);
    let recovered = r.statistics().await;
    assert!(recovered.generated_at.is_some());
}
