//! Pipeline coordinator: orchestrates the ingestion and query flows.
//!
//! The coordinator owns the chunker, the extraction registry, the vector index, the
//! retrieval coordinator, and the answer synthesizer; all are constructed once and
//! injected, with no process-wide state beyond the store's own lifecycle. Each
//! external request gets a fresh trace identifier that every downstream message and
//! log line carries.

use crate::{
    config::{Config, EmbeddingProvider, GenerationProvider},
    embedding::{EmbeddingClient, HashEmbeddingClient, OllamaEmbeddingClient},
    extraction::{ExtractorRegistry, source_name},
    generation::{
        GenerationClient, GenerationClientError, OllamaGenerationClient,
        OpenRouterGenerationClient,
    },
    index::{IndexError, VectorIndex, VectorSearch},
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::{
        chunking::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
        retrieval::{DEFAULT_FETCH_K, DEFAULT_TOP_K, RetrievalCoordinator},
        synthesis::AnswerSynthesizer,
        types::{Chunk, FinalResponse, IngestReport, PipelineError, SOURCE_KEY},
    },
    protocol::{Message, MessageKind, Stage, TraceId},
    qdrant::QdrantStore,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstraction over the pipeline used by external surfaces (HTTP, tests).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Extract, chunk, embed, and index a batch of files.
    async fn ingest_files(&self, paths: Vec<PathBuf>) -> Result<IngestReport, PipelineError>;

    /// Answer a natural-language query from the indexed corpus.
    async fn answer_query(&self, query: &str) -> Result<FinalResponse, PipelineError>;

    /// Remove all indexed data.
    async fn clear(&self) -> Result<(), PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Orchestrates ingestion (extract → chunk → embed+index) and query
/// (retrieve → synthesize) flows. Stateless across requests; the vector index is
/// the only shared mutable resource.
pub struct PipelineCoordinator {
    extractors: ExtractorRegistry,
    chunker: Chunker,
    index: Arc<VectorIndex>,
    retriever: RetrievalCoordinator,
    synthesizer: AnswerSynthesizer,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineCoordinator {
    /// Assemble a coordinator from pre-built components.
    pub fn new(
        extractors: ExtractorRegistry,
        chunker: Chunker,
        index: Arc<VectorIndex>,
        retriever: RetrievalCoordinator,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            extractors,
            chunker,
            index,
            retriever,
            synthesizer,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the full pipeline from configuration: store handle, embedding and
    /// generation clients, and the index binding.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let store = QdrantStore::new(&config.qdrant_url, config.qdrant_api_key.clone())
            .map_err(IndexError::Store)?;
        let index = Arc::new(VectorIndex::new(
            store,
            config.qdrant_collection_name.clone(),
        ));

        let embedder: Arc<dyn EmbeddingClient> = match config.embedding_provider {
            EmbeddingProvider::Hash => {
                Arc::new(HashEmbeddingClient::new(config.embedding_dimension))
            }
            EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
                config.ollama_url.clone(),
                config.embedding_model.clone(),
                config.embedding_dimension,
            )),
        };
        index.create_or_load(embedder).await?;

        let generation: Arc<dyn GenerationClient> = match config.generation_provider {
            GenerationProvider::OpenRouter => {
                let api_key = config.openrouter_api_key.clone().ok_or_else(|| {
                    GenerationClientError::ProviderUnavailable(
                        "OPENROUTER_API_KEY not set".to_string(),
                    )
                })?;
                Arc::new(OpenRouterGenerationClient::new(
                    config.openrouter_url.clone(),
                    api_key,
                    config.generation_model.clone(),
                ))
            }
            GenerationProvider::Ollama => Arc::new(OllamaGenerationClient::new(
                config.ollama_url.clone(),
                config.generation_model.clone(),
            )),
        };

        let retriever = RetrievalCoordinator::new(
            Arc::clone(&index) as Arc<dyn VectorSearch>,
            config.retrieval_fetch_k.unwrap_or(DEFAULT_FETCH_K),
            config.retrieval_top_k.unwrap_or(DEFAULT_TOP_K),
        );
        let chunker = Chunker::new(
            config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            config.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
        );

        Ok(Self::new(
            ExtractorRegistry::with_defaults(),
            chunker,
            index,
            retriever,
            AnswerSynthesizer::new(generation),
        ))
    }

    /// Ingest a batch of files: extraction → chunking → embedding+indexing.
    ///
    /// Fail-fast: the first file that fails extraction aborts the batch, and nothing
    /// from the batch reaches the index. A batch that completes with zero chunks is a
    /// valid terminal state, reported distinctly from failure.
    pub async fn ingest_files(&self, paths: Vec<PathBuf>) -> Result<IngestReport, PipelineError> {
        let trace_id = TraceId::new();
        tracing::info!(trace_id = %trace_id, files = paths.len(), "Starting ingestion batch");

        let mut files = Vec::with_capacity(paths.len());
        let mut chunks: Vec<Chunk> = Vec::new();

        for path in &paths {
            let batch_chunks = self.extract_and_chunk(path, &trace_id).await?;
            files.push(source_name(path));
            chunks.extend(batch_chunks);
        }

        if chunks.is_empty() {
            tracing::info!(trace_id = %trace_id, "Batch completed with no extractable text");
            self.metrics.record_ingestion(files.len() as u64, 0);
            return Ok(IngestReport {
                trace_id,
                files,
                chunk_count: 0,
                indexed: 0,
                skipped_duplicates: 0,
            });
        }

        let chunk_count = chunks.len();
        let (indexed, skipped_duplicates) = self
            .index
            .add_documents(&chunks)
            .await
            .inspect_err(|error| {
                tracing::error!(trace_id = %trace_id, error = %error, "Indexing failed; batch aborted");
            })?;

        self.metrics
            .record_ingestion(files.len() as u64, indexed as u64);

        let report = IngestReport {
            trace_id,
            files,
            chunk_count,
            indexed,
            skipped_duplicates,
        };
        let message = Message::new(
            Stage::Coordinator,
            Stage::Caller,
            MessageKind::IngestionResult,
            report.trace_id.clone(),
            report,
        );
        tracing::info!(
            trace_id = %message.trace_id,
            chunks = message.payload.chunk_count,
            indexed = message.payload.indexed,
            skipped_duplicates = message.payload.skipped_duplicates,
            "Ingestion batch completed"
        );
        Ok(message.payload)
    }

    async fn extract_and_chunk(
        &self,
        path: &Path,
        trace_id: &TraceId,
    ) -> Result<Vec<Chunk>, PipelineError> {
        let source = source_name(path);
        let text = self.extractors.extract(path).await.inspect_err(|error| {
            tracing::error!(trace_id = %trace_id, file = %source, error = %error, "Extraction failed; batch aborted");
        })?;

        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.clone());
        let chunks = self.chunker.process(&text, &metadata);
        tracing::debug!(trace_id = %trace_id, file = %source, chunks = chunks.len(), "File chunked");
        Ok(chunks)
    }

    /// Answer a query: retrieval → synthesis.
    ///
    /// Retrieval never fails on "no matches"; synthesis may fail when the generation
    /// capability does, and that failure reaches the caller unmasked.
    pub async fn answer_query(&self, query: &str) -> Result<FinalResponse, PipelineError> {
        let trace_id = TraceId::new();
        tracing::info!(trace_id = %trace_id, "Coordinator started processing query");

        let retrieval = self
            .retriever
            .retrieve_context(query, &trace_id)
            .await
            .inspect_err(|error| {
                tracing::error!(trace_id = %trace_id, error = %error, "Context retrieval failed");
            })?;
        let synthesis = self
            .synthesizer
            .generate_response(query, &retrieval.payload, &trace_id)
            .await
            .inspect_err(|error| {
                tracing::error!(trace_id = %trace_id, error = %error, "Answer synthesis failed");
            })?;

        self.metrics.record_query();

        let response = Message::new(
            Stage::Coordinator,
            Stage::Caller,
            MessageKind::FinalResponse,
            trace_id.clone(),
            FinalResponse {
                trace_id,
                answer: synthesis.payload.answer,
                sources: retrieval.payload.sources,
            },
        );
        tracing::info!(
            trace_id = %response.trace_id,
            sources = ?response.payload.sources,
            "Query completed"
        );
        Ok(response.payload)
    }

    /// Remove all indexed data. Idempotent.
    pub async fn clear(&self) -> Result<(), PipelineError> {
        let trace_id = TraceId::new();
        self.index.clear().await.inspect_err(|error| {
            tracing::error!(trace_id = %trace_id, error = %error, "Clear failed");
        })?;
        tracing::info!(trace_id = %trace_id, "Index cleared");
        Ok(())
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for PipelineCoordinator {
    async fn ingest_files(&self, paths: Vec<PathBuf>) -> Result<IngestReport, PipelineError> {
        PipelineCoordinator::ingest_files(self, paths).await
    }

    async fn answer_query(&self, query: &str) -> Result<FinalResponse, PipelineError> {
        PipelineCoordinator::answer_query(self, query).await
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        PipelineCoordinator::clear(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineCoordinator::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionError;
    use httpmock::{Method::GET, Method::PUT, MockServer};
    use serde_json::json;
    use std::io::Write;

    async fn coordinator_with_mock_store(server: &MockServer) -> PipelineCoordinator {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let store = QdrantStore::new(&server.base_url(), None).expect("store");
        let index = Arc::new(VectorIndex::new(store, "docs"));
        index
            .create_or_load(Arc::new(HashEmbeddingClient::new(4)))
            .await
            .expect("index ready");

        let retriever = RetrievalCoordinator::new(
            Arc::clone(&index) as Arc<dyn VectorSearch>,
            DEFAULT_FETCH_K,
            DEFAULT_TOP_K,
        );
        let generation: Arc<dyn GenerationClient> =
            Arc::new(OllamaGenerationClient::new(Some(server.base_url()), "m".into()));

        PipelineCoordinator::new(
            ExtractorRegistry::with_defaults(),
            Chunker::default(),
            index,
            retriever,
            AnswerSynthesizer::new(generation),
        )
    }

    #[tokio::test]
    async fn first_failing_file_aborts_the_batch() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;
        let coordinator = coordinator_with_mock_store(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.txt");
        let mut file = std::fs::File::create(&good).expect("create");
        writeln!(file, "perfectly fine content").expect("write");
        let bad = dir.path().join("slides.pptx");

        let error = coordinator
            .ingest_files(vec![good, bad])
            .await
            .expect_err("batch aborts");
        assert!(matches!(
            error,
            PipelineError::Extraction(ExtractionError::UnsupportedFormat { .. })
        ));
        // Nothing reached the index.
        assert_eq!(upsert.hits_async().await, 0);
    }

    #[tokio::test]
    async fn zero_chunk_batch_completes_without_indexing() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;
        let coordinator = coordinator_with_mock_store(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.txt");
        std::fs::File::create(&empty).expect("create");

        let report = coordinator
            .ingest_files(vec![empty])
            .await
            .expect("valid empty completion");
        assert!(report.no_text_extracted());
        assert_eq!(report.files, vec!["empty.txt"]);
        assert_eq!(upsert.hits_async().await, 0);
    }
}
