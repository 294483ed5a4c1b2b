//! Core data types and error definitions for the pipeline.

use crate::{
    embedding::EmbeddingClientError, extraction::ExtractionError,
    generation::GenerationClientError, index::IndexError, protocol::TraceId,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Metadata key carrying the originating document identifier.
pub const SOURCE_KEY: &str = "source";
/// Metadata key carrying the chunk's uniqueness key within the index.
pub const DOC_ID_KEY: &str = "doc_id";
/// Fallback source label when a chunk carries no `source` metadata.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A contiguous span of source text plus its metadata.
///
/// Created by the chunker, stored by the vector index, and returned by retrieval.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// The chunk text; non-empty after trimming.
    pub content: String,
    /// String metadata attached verbatim at creation; carries at minimum
    /// [`SOURCE_KEY`] and [`DOC_ID_KEY`].
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Construct a chunk from content and metadata.
    pub fn new(content: String, metadata: BTreeMap<String, String>) -> Self {
        Self { content, metadata }
    }

    /// Originating document identifier, or [`UNKNOWN_SOURCE`] when absent.
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
    }

    /// Uniqueness key derived from source and position index, when assigned.
    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get(DOC_ID_KEY).map(String::as_str)
    }
}

/// Ordered chunks judged most relevant to one query, plus the distinct sources
/// represented. Ephemeral; consumed immediately by the synthesizer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    /// Retrieved chunks, nearest-first after the diversity pass.
    pub chunks: Vec<Chunk>,
    /// Distinct `source` values present in `chunks`.
    pub sources: BTreeSet<String>,
}

impl RetrievalResult {
    /// Whether no relevant chunks were found. A normal outcome, not an error.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Summary of a completed ingestion batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Trace identifier assigned to the batch.
    pub trace_id: TraceId,
    /// Source names of the ingested files, in submission order.
    pub files: Vec<String>,
    /// Number of chunks produced across all files.
    pub chunk_count: usize,
    /// Number of points upserted into the index.
    pub indexed: usize,
    /// Chunks dropped within a document because their text duplicated an earlier chunk.
    pub skipped_duplicates: usize,
}

impl IngestReport {
    /// True when the batch completed without extracting any text.
    ///
    /// Distinct from failure: the caller is told no text was extracted, not that an
    /// error occurred.
    pub fn no_text_extracted(&self) -> bool {
        self.chunk_count == 0
    }
}

/// Final answer handed back to the caller for one query.
#[derive(Debug, Clone, Serialize)]
pub struct FinalResponse {
    /// Trace identifier assigned to the query.
    pub trace_id: TraceId,
    /// Synthesized answer text.
    pub answer: String,
    /// Distinct sources the answer was grounded in.
    pub sources: BTreeSet<String>,
}

/// Errors emitted by the pipeline coordinator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A file could not be extracted; aborts the remaining batch.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The vector index rejected an operation.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The generation capability failed while synthesizing an answer.
    #[error(transparent)]
    Generation(#[from] GenerationClientError),
    /// The embedding capability failed outside the index boundary.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
}
