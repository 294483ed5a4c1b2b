//! HTTP surface for the docrag pipeline.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /ingest` – Extract, chunk, embed, and index a batch of files by path.
//!   Returns the batch trace id and indexing counters (`chunk_count`, `indexed`,
//!   `skipped_duplicates`).
//! - `POST /query` – Answer a question from the indexed corpus. Returns the answer
//!   text, the distinct sources it was grounded in, and the trace id.
//! - `POST /clear` – Remove all indexed data.
//! - `GET /metrics` – Observe ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Handlers are generic over [`PipelineApi`], so tests exercise the router against a
//! stub pipeline without any external services.

use crate::pipeline::{PipelineApi, PipelineError};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/ingest", post(ingest_files::<S>))
        .route("/query", post(answer_query::<S>))
        .route("/clear", post(clear_index::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /ingest` endpoint.
#[derive(Deserialize)]
struct IngestRequest {
    /// Paths of the files to ingest, resolved on the server's filesystem.
    paths: Vec<PathBuf>,
}

/// Success response for the `POST /ingest` endpoint.
#[derive(Serialize)]
struct IngestResponse {
    /// Trace identifier assigned to the batch.
    trace_id: String,
    /// Source names of the ingested files, in submission order.
    files: Vec<String>,
    /// Number of chunks produced across all files.
    chunk_count: usize,
    /// Number of points upserted into the index.
    indexed: usize,
    /// Chunks dropped because their text duplicated an earlier chunk in the batch.
    skipped_duplicates: usize,
}

/// Ingest a batch of files into the index.
///
/// The batch is fail-fast: the first file that fails extraction aborts the request
/// and nothing from the batch is indexed. A batch that yields no text completes
/// successfully with `chunk_count: 0`.
async fn ingest_files<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: PipelineApi,
{
    let report = service.ingest_files(request.paths).await?;
    tracing::info!(
        trace_id = %report.trace_id,
        files = report.files.len(),
        chunks = report.chunk_count,
        indexed = report.indexed,
        skipped_duplicates = report.skipped_duplicates,
        "Ingest request completed"
    );
    Ok(Json(IngestResponse {
        trace_id: report.trace_id.to_string(),
        files: report.files,
        chunk_count: report.chunk_count,
        indexed: report.indexed,
        skipped_duplicates: report.skipped_duplicates,
    }))
}

/// Request body for the `POST /query` endpoint.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural-language question to answer from the indexed corpus.
    query: String,
}

/// Success response for the `POST /query` endpoint.
#[derive(Serialize)]
struct QueryResponse {
    /// Trace identifier assigned to the query.
    trace_id: String,
    /// Synthesized answer text, or the fixed fallback when no context matched.
    answer: String,
    /// Distinct sources the answer was grounded in.
    sources: BTreeSet<String>,
}

/// Answer a question from the indexed corpus.
///
/// An empty or whitespace-only query is rejected with `400` before it reaches the
/// pipeline. A query that matches nothing still succeeds, carrying the fixed
/// fallback answer and an empty source list.
async fn answer_query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: PipelineApi,
{
    let query = request.query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }

    let response = service.answer_query(query).await?;
    tracing::info!(
        trace_id = %response.trace_id,
        sources = ?response.sources,
        "Query request completed"
    );
    Ok(Json(QueryResponse {
        trace_id: response.trace_id.to_string(),
        answer: response.answer,
        sources: response.sources,
    }))
}

/// Remove all indexed data. Idempotent.
async fn clear_index<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: PipelineApi,
{
    service.clear().await?;
    Ok(Json(json!({ "cleared": true })))
}

/// Return a concise metrics snapshot with ingestion and query counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: PipelineApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        documents_ingested: snapshot.documents_ingested,
        chunks_indexed: snapshot.chunks_indexed,
        queries_answered: snapshot.queries_answered,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    documents_ingested: u64,
    chunks_indexed: u64,
    queries_answered: u64,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Extract, chunk, embed, and index a batch of files. Response returns { \"chunk_count\": number, \"indexed\": number, \"skipped_duplicates\": number }.",
                request_example: Some(json!({
                    "paths": ["/data/docs/report.txt", "/data/docs/notes.md"]
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from the indexed corpus. Response returns { \"answer\": string, \"sources\": [string] }.",
                request_example: Some(json!({
                    "query": "What skills are listed in the resume?"
                })),
            },
            CommandDescriptor {
                name: "clear",
                method: "POST",
                path: "/clear",
                description: "Remove all indexed data. Idempotent.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Pipeline(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{FinalResponse, IngestReport, PipelineApi, PipelineError};
    use crate::protocol::TraceId;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_pipeline_endpoints() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let ingest = commands
            .iter()
            .find(|cmd| cmd.name == "ingest")
            .expect("ingest command present");

        assert_eq!(ingest.method, "POST");
        assert_eq!(ingest.path, "/ingest");
        assert!(ingest.description.to_lowercase().contains("chunk"));

        // ensure catalog exposes multiple commands for host discovery
        assert!(commands.len() >= 4);
    }

    #[tokio::test]
    async fn ingest_route_reports_batch_counters() {
        let service = Arc::new(StubPipelineService::default());
        let app = create_router(Arc::clone(&service));

        let payload = json!({ "paths": ["/data/a.txt", "/data/b.md"] });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/ingest")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["chunk_count"], 3);
        assert_eq!(json["indexed"], 3);
        assert_eq!(json["files"], json!(["a.txt", "b.md"]));

        let batches = service.ingested.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![PathBuf::from("/data/a.txt"), PathBuf::from("/data/b.md")]
        );
    }

    #[tokio::test]
    async fn query_route_returns_answer_and_sources() {
        let service = Arc::new(StubPipelineService::default());
        let app = create_router(service);

        let payload = json!({ "query": "what is alpha?" });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["answer"], "stub answer");
        assert_eq!(json["sources"], json!(["a.txt"]));
        assert!(json["trace_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_the_pipeline() {
        let service = Arc::new(StubPipelineService::default());
        let app = create_router(Arc::clone(&service));

        let payload = json!({ "query": "   " });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*service.queries.lock().await, Vec::<String>::new());
    }

    #[tokio::test]
    async fn clear_route_reports_success() {
        let service = Arc::new(StubPipelineService::default());
        let app = create_router(Arc::clone(&service));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/clear")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*service.clears.lock().await, 1);
    }

    #[tokio::test]
    async fn metrics_route_serializes_the_snapshot() {
        let service = Arc::new(StubPipelineService::default());
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["documents_ingested"], 7);
        assert_eq!(json["queries_answered"], 3);
    }

    #[derive(Default)]
    struct StubPipelineService {
        ingested: Mutex<Vec<Vec<PathBuf>>>,
        queries: Mutex<Vec<String>>,
        clears: Mutex<usize>,
    }

    #[async_trait]
    impl PipelineApi for StubPipelineService {
        async fn ingest_files(
            &self,
            paths: Vec<PathBuf>,
        ) -> Result<IngestReport, PipelineError> {
            let files = paths
                .iter()
                .map(|path| crate::extraction::source_name(path))
                .collect();
            self.ingested.lock().await.push(paths);
            Ok(IngestReport {
                trace_id: TraceId::new(),
                files,
                chunk_count: 3,
                indexed: 3,
                skipped_duplicates: 0,
            })
        }

        async fn answer_query(&self, query: &str) -> Result<FinalResponse, PipelineError> {
            self.queries.lock().await.push(query.to_string());
            let mut sources = BTreeSet::new();
            sources.insert("a.txt".to_string());
            Ok(FinalResponse {
                trace_id: TraceId::new(),
                answer: "stub answer".to_string(),
                sources,
            })
        }

        async fn clear(&self) -> Result<(), PipelineError> {
            *self.clears.lock().await += 1;
            Ok(())
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 7,
                chunks_indexed: 21,
                queries_answered: 3,
            }
        }
    }
}
