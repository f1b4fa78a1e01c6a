use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::models::{AdmitRequest, AdmitResponse, CodeSnippet};
use crate::search::{AdmitOutcome, DeleteOutcome, UpdateOutcome};
use crate::state::AppState;

/// POST /api/code - Admit a single snippet
pub async fn add_snippet(
    State(state): State<AppState>,
    Json(req): Json<AdmitRequest>,
) -> Result<(StatusCode, Json<AdmitResponse>), (StatusCode, String)> {
    let outcomes = state.retriever.admit_batch(vec![req]).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Admission failed: {e:#}"),
        )
    })?;

    match outcomes.into_iter().next() {
        Some(AdmitOutcome::Admitted {
            code_id,
            dependencies,
        }) => Ok((
            StatusCode::CREATED,
            Json(AdmitResponse {
                code_id,
                dependencies,
            }),
        )),
        Some(AdmitOutcome::Rejected { reason }) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, reason))
        }
        // A single-item batch cannot contain a duplicate, and the pipeline
        // returns one outcome per input.
        _ => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Admission produced no outcome".to_string(),
        )),
    }
}

/// POST /api/code/batch - Admit a batch, reporting per-item outcomes
pub async fn add_snippets(
    State(state): State<AppState>,
    Json(batch): Json<Vec<AdmitRequest>>,
) -> Result<Json<Vec<AdmitOutcome>>, (StatusCode, String)> {
    let outcomes = state.retriever.admit_batch(batch).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Admission failed: {e:#}"),
        )
    })?;
    Ok(Json(outcomes))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub language: Option<String>,
    pub repo_name: Option<String>,
}

fn default_limit() -> usize {
    20
}

/// GET /api/code - Page through stored snippets
pub async fn list_snippets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CodeSnippet>>, (StatusCode, String)> {
    let snippets = state
        .retriever
        .list(
            params.offset,
            params.limit,
            params.language.as_deref(),
            params.repo_name.as_deref(),
        )
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Listing failed: {e:#}"),
            )
        })?;
    Ok(Json(snippets))
}

/// GET /api/code/{id} - Fetch one snippet
pub async fn get_snippet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CodeSnippet>, (StatusCode, String)> {
    match state.retriever.get(&id).await {
        Ok(Some(snippet)) => Ok(Json(snippet)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Snippet not found".to_string())),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Lookup failed: {e:#}"),
        )),
    }
}

/// PUT /api/code/{id} - Replace a snippet wholesale
pub async fn update_snippet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AdmitRequest>,
) -> Result<Json<CodeSnippet>, (StatusCode, String)> {
    match state.retriever.update(&id, req).await {
        Ok(UpdateOutcome::Updated(snippet)) => Ok(Json(snippet)),
        Ok(UpdateOutcome::NotFound) => {
            Err((StatusCode::NOT_FOUND, "Snippet not found".to_string()))
        }
        Ok(UpdateOutcome::Rejected(reason)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Update failed: {e:#}"),
        )),
    }
}

/// DELETE /api/code/{id} - Remove a snippet from both stores
pub async fn delete_snippet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.retriever.delete(&id).await {
        Ok(DeleteOutcome::Deleted) => Ok(StatusCode::NO_CONTENT),
        Ok(DeleteOutcome::NotFound) => {
            Err((StatusCode::NOT_FOUND, "Snippet not found".to_string()))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Delete failed: {e:#}"),
        )),
    }
}
