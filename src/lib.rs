//! # snippet-search
//!
//! A Rust web service for admitting, indexing, and retrieving code snippets
//! with a pipeline combining vector semantic search, graph-based dependency
//! enrichment, and LLM-generated reuse guidance.
//!
//! ## Architecture
//!
//! A retrieval request flows through three stages, in order:
//!
//! ```text
//!                    ┌──────────────┐
//!                    │  User Query   │
//!                    └──────┬───────┘
//!                           │ embed
//!                           ▼
//!               ┌───────────────────────┐
//!               │  Vector ANN Search    │
//!               │  language/repo filter │
//!               │  3× over-fetch when   │
//!               │  dependency filter    │
//!               └───────────┬───────────┘
//!                           │ ranked candidates
//!                           ▼
//!               ┌───────────────────────┐
//!               │  Graph Enrichment     │
//!               │  deps + related ids   │
//!               │  dependency filter    │
//!               │  stop at top_k        │
//!               └───────────┬───────────┘
//!                           │ final result set
//!                           ▼
//!               ┌───────────────────────┐
//!               │  Narratives (opt-in)  │
//!               │  top explain_top_n    │
//!               │  per-result isolation │
//!               └───────────────────────┘
//! ```
//!
//! The vector stage is load-bearing: its failure fails the request. The
//! graph stage degrades per candidate, and the narrative stage never
//! changes membership or order of the results.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, backends, and gate bounds
//! - [`models`] - Shared data types: `CodeSnippet`, request/response types, `Stats`
//! - [`ingest`] - Admission pipeline: quality gate, dependency extraction, batch dedup
//! - [`services`] - Backend clients behind traits: Milvus, Neo4j, embeddings, narratives
//! - [`search`] - The retrieval orchestrator and corpus mutation paths
//! - [`cache`] - Generic TTL cache backing the statistics endpoint
//! - [`api`] - Axum HTTP handlers for search, snippet CRUD, and statistics
//! - [`state`] - Shared application state wiring clients into the orchestrator

pub mod api;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod models;
pub mod search;
pub mod services;
pub mod state;
