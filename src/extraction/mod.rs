//! Table-dispatch registry mapping file extensions to text extractors.
//!
//! The pipeline treats extraction as an opaque capability: given a path, return the
//! extracted UTF-8 text or fail. The registry ships with plain-text readers for common
//! formats and accepts custom extractors for anything richer (PDF, office documents),
//! which belong to external tooling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while extracting text from a file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No extractor is registered for the file's extension.
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat {
        /// Extension (including leading dot) that had no registered extractor.
        extension: String,
    },
    /// A registered extractor failed to read or decode the file.
    #[error("Failed to extract text from {path}: {source}")]
    Failure {
        /// Path of the file that failed.
        path: String,
        /// Underlying read or decode error.
        #[source]
        source: anyhow::Error,
    },
}

/// Capability contract: given a file path, return extracted text or fail.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the full text content of the file at `path`.
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Registry dispatching extraction by lowercase file extension.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Build a registry with the built-in plain-text extractors registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
        };
        let plain: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        for extension in [".txt", ".md", ".markdown", ".csv"] {
            registry.register(extension, Arc::clone(&plain));
        }
        registry
    }

    /// Register an extractor for the given extension (including leading dot).
    ///
    /// Replaces any previous registration for the same extension.
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn TextExtractor>) {
        self.extractors
            .insert(extension.to_lowercase(), extractor);
    }

    /// Extract text from the file at `path` using the extractor registered for its
    /// extension.
    ///
    /// Fails with [`ExtractionError::UnsupportedFormat`] when no extractor matches.
    /// An empty string is a valid result and yields zero chunks downstream.
    pub async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let extractor = self.extractors.get(&extension).ok_or_else(|| {
            ExtractionError::UnsupportedFormat {
                extension: extension.clone(),
            }
        })?;

        tracing::debug!(path = %path.display(), extension, "Extracting text");
        extractor.extract(path).await
    }
}

/// Reads the whole file as UTF-8 text.
struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ExtractionError::Failure {
                path: path.display().to_string(),
                source: err.into(),
            })
    }
}

/// Derive the document identifier attached to chunks from this file.
///
/// Uses the file name rather than the full path so re-ingestion from a different
/// directory still maps to the same source.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
