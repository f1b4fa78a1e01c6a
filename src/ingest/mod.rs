//! Snippet admission pipeline: quality gate → dependency extraction →
//! batch-local dedup.
//!
//! The pipeline validates raw candidates and derives metadata; it never
//! rewrites code content beyond trimming surrounding whitespace.

pub mod dedup;
pub mod deps;
pub mod quality;

pub use dedup::dedupe_batch;
pub use deps::{extract_dependencies, Language};
pub use quality::{QualityGate, RejectReason};
