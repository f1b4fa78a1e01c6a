use axum::extract::State;
use axum::Json;

use crate::models::Stats;
use crate::state::AppState;

/// GET /api/stats - Corpus statistics
///
/// Served from a short-TTL cache; assembly failures degrade to the empty
/// aggregate rather than an error response.
pub async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.retriever.statistics().await)
}
