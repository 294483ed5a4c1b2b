//! Message envelope passed between pipeline stages.
//!
//! Every internal hand-off (retrieval → synthesis → coordinator) travels inside a
//! [`Message`], which carries the sending and receiving stage, a closed message kind,
//! and the trace identifier minted when the external request arrived. Messages are
//! immutable value objects; stages construct a new one rather than mutating what they
//! received.

use serde::Serialize;
use uuid::Uuid;

/// Correlation identifier threaded through every message belonging to one request.
///
/// Opaque to all business logic; used only for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TraceId(String);

impl TraceId {
    /// Mint a fresh trace identifier for a new external request.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stages that can appear as message senders or receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The pipeline coordinator orchestrating a request.
    Coordinator,
    /// The retrieval coordinator producing ranked context.
    Retrieval,
    /// The answer synthesizer wrapping the generation capability.
    Synthesis,
    /// The external caller (HTTP front end or test harness).
    Caller,
}

/// Closed set of message categories exchanged between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Ranked chunks produced by the retrieval coordinator.
    RetrievalResult,
    /// Synthesized answer produced by the generation stage.
    LlmResponse,
    /// Final response handed back to the caller.
    FinalResponse,
    /// Summary of a completed ingestion batch.
    IngestionResult,
}

/// Immutable envelope carrying one payload between two stages.
#[derive(Debug, Clone, Serialize)]
pub struct Message<P> {
    /// Stage that produced the message.
    pub sender: Stage,
    /// Stage the message is addressed to.
    pub receiver: Stage,
    /// Category tag describing the payload.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Trace identifier of the request this message belongs to.
    pub trace_id: TraceId,
    /// The data being passed.
    pub payload: P,
}

impl<P> Message<P> {
    /// Construct a new message envelope.
    pub fn new(
        sender: Stage,
        receiver: Stage,
        kind: MessageKind,
        trace_id: TraceId,
        payload: P,
    ) -> Self {
        Self {
            sender,
            receiver,
            kind,
            trace_id,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        let a = TraceId::new();
        let b = TraceId::new();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let msg = Message::new(
            Stage::Retrieval,
            Stage::Synthesis,
            MessageKind::RetrievalResult,
            TraceId::new(),
            serde_json::json!({ "chunks": [] }),
        );
        let value = serde_json::to_value(&msg).expect("serializable");
        assert_eq!(value["type"], "RETRIEVAL_RESULT");
        assert_eq!(value["sender"], "retrieval");
        assert_eq!(value["receiver"], "synthesis");
        assert!(value["trace_id"].is_string());
    }
}
