//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantStore;
pub use payload::{compute_content_hash, point_id_for};
pub use types::{PointInsert, QdrantError, ScoredPoint};
