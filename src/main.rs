use axum::routing::{delete, get, post, put};
use axum::Router;
use tracing_subscriber::EnvFilter;

use snippet_search::api;
use snippet_search::config::Config;
use snippet_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Vector index: {} ({})", config.vector.base_url, config.vector.collection);
    tracing::info!("Relationship store: {} ({})", config.graph.base_url, config.graph.database);
    tracing::info!(
        "Embedding provider: {} ({})",
        config.embedding.provider,
        config.embedding.model
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health))
        .route("/api/search", post(api::search::search))
        .route("/api/stats", get(api::stats::stats))
        .route("/api/code", get(api::snippets::list_snippets))
        .route("/api/code", post(api::snippets::add_snippet))
        .route("/api/code/batch", post(api::snippets::add_snippets))
        .route("/api/code/{id}", get(api::snippets::get_snippet))
        .route("/api/code/{id}", put(api::snippets::update_snippet))
        .route("/api/code/{id}", delete(api::snippets::delete_snippet))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
