//! Answer synthesis: grounded prompt assembly around the generation capability.

use crate::{
    generation::{GenerationClient, GenerationClientError},
    protocol::{Message, MessageKind, Stage, TraceId},
    pipeline::types::RetrievalResult,
};
use serde::Serialize;
use std::sync::Arc;

/// Fixed answer returned when retrieval produced no context.
///
/// Returned without invoking the generation capability, so behavior on an empty
/// corpus is deterministic and free.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant information in the uploaded documents to answer your question.";

/// Synthesized answer payload carried by an `LLM_RESPONSE` message.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedAnswer {
    /// Answer text produced by the model or the fixed fallback.
    pub answer: String,
    /// The query the answer responds to.
    pub query: String,
}

/// Wraps the generation capability and assembles grounded prompts.
pub struct AnswerSynthesizer {
    client: Arc<dyn GenerationClient>,
}

impl AnswerSynthesizer {
    /// Construct a synthesizer over the given generation client.
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    /// Synthesize an answer for `query` grounded in the retrieved chunks.
    ///
    /// The generation capability is invoked at most once; when the retrieval result
    /// is empty it is not invoked at all. Generation failures propagate verbatim so
    /// callers can distinguish "no context" from "generation broke".
    pub async fn generate_response(
        &self,
        query: &str,
        retrieved: &RetrievalResult,
        trace_id: &TraceId,
    ) -> Result<Message<SynthesizedAnswer>, GenerationClientError> {
        let answer = if retrieved.is_empty() {
            tracing::warn!(trace_id = %trace_id, "No context retrieved; returning fixed fallback answer");
            NO_CONTEXT_ANSWER.to_string()
        } else {
            let prompt = build_prompt(query, retrieved);
            tracing::debug!(
                trace_id = %trace_id,
                prompt_chars = prompt.len(),
                sources = ?retrieved.sources,
                "Invoking generation capability"
            );
            self.client.generate(&prompt).await?
        };

        Ok(Message::new(
            Stage::Synthesis,
            Stage::Coordinator,
            MessageKind::LlmResponse,
            trace_id.clone(),
            SynthesizedAnswer {
                answer,
                query: query.to_string(),
            },
        ))
    }
}

/// Assemble the grounded prompt: one labeled section per chunk, then the query and
/// fixed grounding instructions.
pub fn build_prompt(query: &str, retrieved: &RetrievalResult) -> String {
    let context = retrieved
        .chunks
        .iter()
        .map(|chunk| format!("--- Context from: {} ---\n{}", chunk.source(), chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful and precise assistant. Use the following context, which is \
composed of sections from different documents, to answer the question.\n\
Your answer should be comprehensive and synthesize information from all relevant sources provided.\n\
Explicitly mention the source document when the information is specific to one file.\n\n\
CONTEXT:\n{context}\n\n\
QUESTION: {query}\n\n\
INSTRUCTIONS:\n\
1. Base your answer *only* on the provided context.\n\
2. If the context contains information from multiple documents, synthesize it into a single, coherent answer.\n\
3. Be specific and mention concrete details, skills, or concepts from the context.\n\
4. If the context does not contain enough information to answer the question, clearly state that the information is not available in the provided documents.\n\
5. Do not make up information.\n\n\
ANSWER:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Chunk, SOURCE_KEY};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
        reply: Result<&'static str, ()>,
    }

    #[async_trait]
    impl GenerationClient for CountingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(GenerationClientError::GenerationFailed("timeout".into())),
            }
        }
    }

    fn chunk(source: &str, content: &str) -> Chunk {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        Chunk::new(content.to_string(), metadata)
    }

    fn result_with(chunks: Vec<Chunk>) -> RetrievalResult {
        let sources: BTreeSet<String> =
            chunks.iter().map(|chunk| chunk.source().to_string()).collect();
        RetrievalResult { chunks, sources }
    }

    #[tokio::test]
    async fn empty_context_returns_fallback_without_generation() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            reply: Ok("unused"),
        });
        let synthesizer = AnswerSynthesizer::new(Arc::clone(&client) as Arc<dyn GenerationClient>);

        let message = synthesizer
            .generate_response("question", &RetrievalResult::default(), &TraceId::new())
            .await
            .expect("fallback answer");

        assert_eq!(message.payload.answer, NO_CONTEXT_ANSWER);
        assert_eq!(message.kind, MessageKind::LlmResponse);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_is_invoked_exactly_once_with_context() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            reply: Ok("synthesized"),
        });
        let synthesizer = AnswerSynthesizer::new(Arc::clone(&client) as Arc<dyn GenerationClient>);

        let retrieved = result_with(vec![chunk("a.txt", "alpha facts")]);
        let message = synthesizer
            .generate_response("question", &retrieved, &TraceId::new())
            .await
            .expect("answer");

        assert_eq!(message.payload.answer, "synthesized");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_failure_propagates_verbatim() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            reply: Err(()),
        });
        let synthesizer = AnswerSynthesizer::new(client as Arc<dyn GenerationClient>);

        let retrieved = result_with(vec![chunk("a.txt", "alpha facts")]);
        let error = synthesizer
            .generate_response("question", &retrieved, &TraceId::new())
            .await
            .expect_err("generation failure");
        assert!(matches!(error, GenerationClientError::GenerationFailed(_)));
    }

    #[test]
    fn prompt_labels_each_source_section() {
        let retrieved = result_with(vec![
            chunk("a.txt", "alpha facts"),
            chunk("b.txt", "beta facts"),
        ]);
        let prompt = build_prompt("What is alpha?", &retrieved);

        assert!(prompt.contains("--- Context from: a.txt ---\nalpha facts"));
        assert!(prompt.contains("--- Context from: b.txt ---\nbeta facts"));
        assert!(prompt.contains("QUESTION: What is alpha?"));
        assert!(prompt.contains("Base your answer *only* on the provided context"));
        assert!(prompt.contains("Do not make up information"));
    }
}
