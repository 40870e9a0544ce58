//! Per-origin deduplication

use crate::models::{HttpMethod, RequestCandidate, RequestKind};
use std::collections::HashSet;

type DedupKey = (RequestKind, Option<HttpMethod>, String, Option<String>);

fn key(candidate: &RequestCandidate) -> DedupKey {
    (
        candidate.kind,
        candidate.method,
        candidate.url.clone(),
        candidate
            .parameters
            .as_ref()
            .map(|p| p.display_text().to_string()),
    )
}

/// Drops repeated candidates, keeping the first occurrence and discovery order.
///
/// Callers pass one origin's findings at a time; the same endpoint seen in two
/// origins is reported under both.
pub fn dedup(candidates: Vec<RequestCandidate>) -> Vec<RequestCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(key(candidate)))
        .collect()
}
