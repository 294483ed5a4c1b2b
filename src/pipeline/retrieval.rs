//! Retrieval coordination: similarity search plus a source-diversity pass.
//!
//! The coordinator over-fetches candidates from the index, then narrows them so the
//! final context spans every source that surfaced, rather than letting one verbose
//! document crowd out the rest.

use crate::{
    index::{IndexError, VectorSearch},
    protocol::{Message, MessageKind, Stage, TraceId},
    qdrant::compute_content_hash,
    pipeline::types::RetrievalResult,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Default number of candidates fetched before the diversity pass.
pub const DEFAULT_FETCH_K: usize = 10;
/// Default cap on the number of chunks handed to the synthesizer.
pub const DEFAULT_TOP_K: usize = 5;

/// Runs similarity search and applies the diversity/deduplication policy.
pub struct RetrievalCoordinator {
    index: Arc<dyn VectorSearch>,
    fetch_k: usize,
    top_k: usize,
}

impl RetrievalCoordinator {
    /// Construct a coordinator over the given index.
    ///
    /// `fetch_k` is clamped to at least `top_k` so the diversity pass always has the
    /// full candidate pool to choose from.
    pub fn new(index: Arc<dyn VectorSearch>, fetch_k: usize, top_k: usize) -> Self {
        let top_k = top_k.max(1);
        Self {
            index,
            fetch_k: fetch_k.max(top_k),
            top_k,
        }
    }

    /// Retrieve the context chunks most relevant to `query`.
    ///
    /// Zero candidates is a valid outcome and produces an empty result; only
    /// capability-level faults (embedding, store) surface as errors.
    pub async fn retrieve_context(
        &self,
        query: &str,
        trace_id: &TraceId,
    ) -> Result<Message<RetrievalResult>, IndexError> {
        tracing::info!(trace_id = %trace_id, query, "Starting document retrieval");

        let candidates = self.index.similarity_search(query, self.fetch_k).await?;

        if candidates.is_empty() {
            tracing::warn!(trace_id = %trace_id, "No relevant documents found for the query");
            return Ok(self.into_message(trace_id, RetrievalResult::default()));
        }

        let result = diversify(candidates, self.top_k);
        tracing::info!(
            trace_id = %trace_id,
            chunks = result.chunks.len(),
            sources = ?result.sources,
            "Retrieved context"
        );

        Ok(self.into_message(trace_id, result))
    }

    fn into_message(
        &self,
        trace_id: &TraceId,
        result: RetrievalResult,
    ) -> Message<RetrievalResult> {
        Message::new(
            Stage::Retrieval,
            Stage::Synthesis,
            MessageKind::RetrievalResult,
            trace_id.clone(),
            result,
        )
    }
}

/// Narrow ranked candidates to at most `cap` chunks.
///
/// Guarantees at least one chunk from every distinct source in the candidate set
/// (nearest chunk per source, in rank order) as long as the cap allows, then fills
/// the remaining slots with the next-nearest candidates overall. Exact content
/// duplicates are skipped throughout. The final chunks keep nearest-first order.
fn diversify(candidates: Vec<crate::pipeline::types::Chunk>, cap: usize) -> RetrievalResult {
    let mut selected: Vec<usize> = Vec::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut covered_sources: HashSet<String> = HashSet::new();

    // First pass: the single nearest chunk per distinct source.
    for (rank, chunk) in candidates.iter().enumerate() {
        if selected.len() == cap {
            break;
        }
        let source = chunk.source().to_string();
        if covered_sources.contains(&source) {
            continue;
        }
        let hash = compute_content_hash(&chunk.content);
        if !seen_hashes.insert(hash) {
            continue;
        }
        covered_sources.insert(source);
        selected.push(rank);
    }

    // Second pass: fill remaining slots with the next-nearest overall.
    for (rank, chunk) in candidates.iter().enumerate() {
        if selected.len() == cap {
            break;
        }
        if selected.contains(&rank) {
            continue;
        }
        let hash = compute_content_hash(&chunk.content);
        if !seen_hashes.insert(hash) {
            continue;
        }
        selected.push(rank);
    }

    selected.sort_unstable();
    let wanted: HashSet<usize> = selected.into_iter().collect();

    let mut sources = BTreeSet::new();
    let mut chunks = Vec::with_capacity(wanted.len());
    for (rank, chunk) in candidates.into_iter().enumerate() {
        if wanted.contains(&rank) {
            sources.insert(chunk.source().to_string());
            chunks.push(chunk);
        }
    }

    RetrievalResult { chunks, sources }
}
