//! Retrieval orchestration: vector candidates, graph enrichment, narratives.

pub mod orchestrator;

pub use orchestrator::{AdmitOutcome, DeleteOutcome, Retriever, UpdateOutcome};
