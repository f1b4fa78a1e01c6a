use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

/// POST /api/search - Hybrid retrieval pipeline:
///   1. Embed the query
///   2. ANN search with optional language/repo filters (3× over-fetch when
///      a dependency filter is present)
///   3. Graph enrichment + dependency filtering, short-circuit at top_k
///   4. Optional reuse-guidance narratives for the leading results
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    if req.top_k == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "top_k must be at least 1".to_string(),
        ));
    }

    let response = state.retriever.search(&req).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Search failed: {e:#}"),
        )
    })?;

    Ok(Json(response))
}
