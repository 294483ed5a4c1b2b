//! Retrieval-augmented QA pipeline: chunking, retrieval, synthesis, and orchestration.

pub mod chunking;
pub mod coordinator;
pub mod retrieval;
pub mod synthesis;
pub mod types;

pub use chunking::Chunker;
pub use coordinator::{PipelineApi, PipelineCoordinator};
pub use retrieval::RetrievalCoordinator;
pub use synthesis::AnswerSynthesizer;
pub use types::{Chunk, FinalResponse, IngestReport, PipelineError, RetrievalResult};
