use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Vector index (Milvus) configuration
    pub vector: VectorConfig,
    /// Relationship store (Neo4j) configuration
    pub graph: GraphConfig,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// Narrative LLM configuration
    pub llm: LlmConfig,
    /// Admission gate bounds
    pub gate: GateConfig,
    /// Statistics cache TTL in seconds
    pub stats_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Base URL for the Milvus RESTful v2 API (e.g. "http://localhost:19530")
    pub base_url: String,
    pub collection: String,
    /// Vector dimension; must match the embedding model's output
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL for the Neo4j HTTP API (e.g. "http://localhost:7474")
    pub base_url: String,
    /// Database name used in the transactional endpoint path
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// API key. Narrative generation is disabled entirely when the openai
    /// provider has no key configured.
    pub api_key: Option<String>,
    pub max_tokens: u32,
}

/// Bounds for the snippet admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum non-empty line count
    pub min_lines: usize,
    /// Maximum total line count
    pub max_lines: usize,
    /// Maximum comment-line ratio before rejection
    pub max_comment_ratio: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            vector: VectorConfig::default(),
            graph: GraphConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            gate: GateConfig::default(),
            stats_ttl_secs: 300,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:19530".to_string(),
            collection: "code_snippets".to_string(),
            dimension: 768,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            max_tokens: 1000,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_lines: 5,
            max_lines: 200,
            max_comment_ratio: 0.5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SNIPPET_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(url) = std::env::var("MILVUS_BASE_URL") {
            config.vector.base_url = url;
        }
        if let Ok(name) = std::env::var("MILVUS_COLLECTION") {
            config.vector.collection = name;
        }
        if let Ok(dim) = std::env::var("MILVUS_DIMENSION") {
            if let Ok(d) = dim.parse() {
                config.vector.dimension = d;
            }
        }

        if let Ok(url) = std::env::var("NEO4J_BASE_URL") {
            config.graph.base_url = url;
        }
        if let Ok(db) = std::env::var("NEO4J_DATABASE") {
            config.graph.database = db;
        }
        if let Ok(user) = std::env::var("NEO4J_USER") {
            config.graph.user = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            config.graph.password = Some(password);
        }

        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }

        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.llm.max_tokens = v;
            }
        }

        if let Ok(val) = std::env::var("GATE_MIN_LINES") {
            if let Ok(v) = val.parse() {
                config.gate.min_lines = v;
            }
        }
        if let Ok(val) = std::env::var("GATE_MAX_LINES") {
            if let Ok(v) = val.parse() {
                config.gate.max_lines = v;
            }
        }
        if let Ok(val) = std::env::var("GATE_MAX_COMMENT_RATIO") {
            if let Ok(v) = val.parse() {
                config.gate.max_comment_ratio = v;
            }
        }
        if let Ok(val) = std::env::var("STATS_CACHE_TTL_SECS") {
            if let Ok(v) = val.parse() {
                config.stats_ttl_secs = v;
            }
        }

        config
    }
}
