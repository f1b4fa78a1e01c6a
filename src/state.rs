use std::sync::Arc;

use crate::config::Config;
use crate::search::Retriever;
use crate::services::embedding::EmbeddingClient;
use crate::services::llm::NarrativeClient;
use crate::services::milvus::MilvusClient;
use crate::services::neo4j::Neo4jClient;
use crate::services::NarrativeModel;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let embedder = Arc::new(EmbeddingClient::new(
            http_client.clone(),
            config.embedding.clone(),
        ));
        let index = Arc::new(MilvusClient::new(http_client.clone(), &config.vector));
        let graph = Arc::new(Neo4jClient::new(http_client.clone(), &config.graph));

        // A missing narrative model only disables reuse guidance; search and
        // ingestion keep working.
        let narrator: Option<Arc<dyn NarrativeModel>> =
            match NarrativeClient::new(http_client, config.llm.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("narrative model disabled: {e:#}");
                    None
                }
            };

        let retriever = Arc::new(Retriever::new(&config, embedder, index, graph, narrator));

        Ok(Self { config, retriever })
    }
}
