//! Batch-local dedup of admitted snippets.
//!
//! Identity is the SHA-256 of the trimmed content, scoped to the batch
//! being processed. The persisted corpus is not consulted, so a snippet
//! byte-identical to one already stored is still re-admitted.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::CodeSnippet;

/// Remove snippets whose normalized content already appeared earlier in the
/// batch, keeping the first occurrence. Order is otherwise preserved.
pub fn dedupe_batch(batch: Vec<CodeSnippet>) -> Vec<CodeSnippet> {
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut unique = Vec::with_capacity(batch.len());

    for snippet in batch {
        let hash = content_hash(&snippet.code);
        if seen.insert(hash) {
            unique.push(snippet);
        }
    }

    unique
}

fn content_hash(code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().as_bytes());
    hasher.finalize().into()
}
