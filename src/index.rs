//! Vector index facade: binds the embedding capability to the persistent store.
//!
//! The index is the only shared mutable resource in the pipeline. Mutations
//! (`add_documents`, `clear`) serialize behind a writer lock; searches take a reader
//! lock so they never observe a partially applied write.

use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError},
    pipeline::types::{Chunk, DOC_ID_KEY},
    qdrant::{PointInsert, QdrantError, QdrantStore, compute_content_hash},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors returned by vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An operation was attempted before `create_or_load` bound the embedding capability.
    #[error("Vector index not initialized; call create_or_load first")]
    NotInitialized,
    /// The embedding capability failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The embedding capability returned no vector for the query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// The backing store rejected a request.
    #[error("Vector store request failed: {0}")]
    Store(#[from] QdrantError),
}

/// Read-side contract offered to the retrieval coordinator.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` stored chunks nearest to `query`, nearest-first.
    ///
    /// An empty store yields an empty list, not an error.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, IndexError>;
}

/// Persistent chunk index backed by a Qdrant collection.
pub struct VectorIndex {
    store: QdrantStore,
    collection: String,
    embedder: RwLock<Option<Arc<dyn EmbeddingClient>>>,
}

impl VectorIndex {
    /// Wrap a store handle and collection name. The index is unusable until
    /// [`VectorIndex::create_or_load`] binds an embedding capability.
    pub fn new(store: QdrantStore, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            embedder: RwLock::new(None),
        }
    }

    /// Idempotent initialization: ensure the collection exists and bind the embedding
    /// capability used for all subsequent adds and searches.
    pub async fn create_or_load(
        &self,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<(), IndexError> {
        self.store
            .create_collection_if_not_exists(&self.collection, embedder.dimension() as u64)
            .await?;
        let mut guard = self.embedder.write().await;
        *guard = Some(embedder);
        tracing::debug!(collection = %self.collection, "Vector index ready");
        Ok(())
    }

    /// Embed and upsert a batch of chunks.
    ///
    /// Each chunk's `doc_id` keys the upsert: repeated ingestion of the same logical
    /// chunk overwrites the stored entry instead of duplicating it. Chunks whose text
    /// duplicates an earlier chunk in the same batch are skipped; the returned pair is
    /// `(upserted, skipped_duplicates)`.
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<(usize, usize), IndexError> {
        let guard = self.embedder.write().await;
        let embedder = guard.as_ref().ok_or(IndexError::NotInitialized)?;

        let mut seen_hashes = HashSet::new();
        let mut pending: Vec<(String, String, usize, String, String)> = Vec::new();
        let mut skipped = 0;

        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.content.trim().is_empty() {
                continue;
            }
            let content_hash = compute_content_hash(&chunk.content);
            let key = (chunk.source().to_string(), content_hash.clone());
            if !seen_hashes.insert(key) {
                skipped += 1;
                continue;
            }
            let doc_id = chunk
                .doc_id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_{position}", chunk.source()));
            pending.push((
                doc_id,
                chunk.source().to_string(),
                position,
                chunk.content.clone(),
                content_hash,
            ));
        }

        if pending.is_empty() {
            return Ok((0, skipped));
        }

        let texts: Vec<String> = pending.iter().map(|entry| entry.3.clone()).collect();
        let vectors = embedder.generate_embeddings(texts).await?;

        let points: Vec<PointInsert> = pending
            .into_iter()
            .zip(vectors)
            .map(
                |((doc_id, source, chunk_index, text, content_hash), vector)| PointInsert {
                    doc_id,
                    source,
                    chunk_index,
                    text,
                    content_hash,
                    vector,
                },
            )
            .collect();

        let upserted = self.store.upsert_points(&self.collection, points).await?;
        Ok((upserted, skipped))
    }

    /// Remove every indexed entry. Idempotent; a no-op on an uninitialized store.
    pub async fn clear(&self) -> Result<(), IndexError> {
        let guard = self.embedder.write().await;
        if guard.is_none() {
            tracing::debug!(collection = %self.collection, "Clear on uninitialized index is a no-op");
            return Ok(());
        }
        self.store.delete_all_points(&self.collection).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorSearch for VectorIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, IndexError> {
        let guard = self.embedder.read().await;
        let embedder = guard.as_ref().ok_or(IndexError::NotInitialized)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = embedder.generate_embeddings(vec![query.to_string()]).await?;
        let vector = vectors.pop().ok_or(IndexError::EmptyEmbedding)?;

        let points = self
            .store
            .search_points(&self.collection, vector, k)
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|point| chunk_from_payload(point.payload))
            .collect())
    }
}

/// Rebuild a chunk from a stored payload; drops points with no usable text.
fn chunk_from_payload(payload: Option<serde_json::Map<String, Value>>) -> Option<Chunk> {
    let mut payload = payload?;
    let content = match payload.remove("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => text,
        _ => return None,
    };

    let mut metadata = BTreeMap::new();
    for (key, value) in payload {
        match value {
            Value::String(text) => {
                metadata.insert(key, text);
            }
            Value::Number(number) => {
                metadata.insert(key, number.to_string());
            }
            _ => {}
        }
    }

    Some(Chunk::new(content, metadata))
}
