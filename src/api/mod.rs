//! HTTP handlers, one module per resource.

pub mod search;
pub mod snippets;
pub mod stats;

use axum::Json;
use serde_json::{json, Value};

/// GET /health - liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET / - service banner
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "snippet-search",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
