#![deny(missing_docs)]

//! Core library for the docrag retrieval-augmented QA pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// File-format dispatch for text extraction.
pub mod extraction;
/// Generation client abstraction and adapters.
pub mod generation;
/// Vector index facade binding embeddings to the persistent store.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters for diagnostics.
pub mod metrics;
/// Retrieval and synthesis pipeline orchestration.
pub mod pipeline;
/// Inter-stage message envelope and trace identifiers.
pub mod protocol;
/// Qdrant vector store integration.
pub mod qdrant;
