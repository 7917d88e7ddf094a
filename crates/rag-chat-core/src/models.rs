//! Core data models used throughout RAG Chat.
//!
//! These types represent the chunks stored in the vector index, the
//! questions and answers flowing through the query orchestrator, and the
//! events exchanged with streaming clients.

use serde::{Deserialize, Serialize};

/// A bounded span of document text with source provenance.
///
/// Created during ingestion and never mutated afterwards; removed only by
/// clearing the whole index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    /// Filename of the document this chunk was cut from.
    pub source: String,
    /// Position of the chunk within its document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
}

/// A chunk returned by a similarity query, with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A single question, as posted to the blocking chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Query {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// The result of a blocking query.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Deduplicated source filenames of the retrieved context.
    pub sources: Vec<String>,
}

/// One discrete unit of the server-to-client event sequence.
///
/// Serializes as `{"type": "<variant>", "content": <payload>}`; `Pong`
/// carries no content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental generated text.
    Token(String),
    /// Deduplicated source identifiers for the answer.
    Sources(Vec<String>),
    /// The full accumulated answer. Terminal.
    Done(String),
    /// A failure description. Terminal.
    Error(String),
    /// Advisory message, e.g. the index is empty.
    Info(String),
    /// Heartbeat reply.
    Pong,
}

impl StreamEvent {
    /// Whether this event ends a query's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }
}

/// An inbound frame on the streaming connection.
///
/// `{"type": "ping"}` is a heartbeat; `{"message": "..."}` is a question.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClientMessage {
    pub fn is_ping(&self) -> bool {
        self.kind.as_deref() == Some("ping")
    }

    /// The question text, if present and not blank.
    pub fn question(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// Collect the distinct sources of `chunks`, keeping first-seen order.
pub fn dedup_sources<'a, I>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        if !sources.iter().any(|s| s == &chunk.source) {
            sources.push(chunk.source.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(source: &str) -> Chunk {
        Chunk {
            id: "id".to_string(),
            source: source.to_string(),
            chunk_index: 0,
            text: "text".to_string(),
            hash: String::new(),
        }
    }

    #[test]
    fn stream_event_wire_format() {
        let token = serde_json::to_value(StreamEvent::Token("Hel".into())).unwrap();
        assert_eq!(token, json!({"type": "token", "content": "Hel"}));

        let sources =
            serde_json::to_value(StreamEvent::Sources(vec!["a.pdf".into()])).unwrap();
        assert_eq!(sources, json!({"type": "sources", "content": ["a.pdf"]}));

        let pong = serde_json::to_value(StreamEvent::Pong).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));
    }

    #[test]
    fn client_message_classification() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(ping.is_ping());
        assert_eq!(ping.question(), None);

        let q: ClientMessage = serde_json::from_str(r#"{"message":"  what?  "}"#).unwrap();
        assert!(!q.is_ping());
        assert_eq!(q.question(), Some("what?"));

        let blank: ClientMessage = serde_json::from_str(r#"{"message":"   "}"#).unwrap();
        assert_eq!(blank.question(), None);

        assert!(serde_json::from_str::<ClientMessage>("[1, 2]").is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let chunks = vec![chunk("b.txt"), chunk("a.pdf"), chunk("b.txt"), chunk("c.docx")];
        assert_eq!(dedup_sources(&chunks), vec!["b.txt", "a.pdf", "c.docx"]);
    }

    #[test]
    fn terminal_events() {
        assert!(StreamEvent::Done(String::new()).is_terminal());
        assert!(StreamEvent::Error(String::new()).is_terminal());
        assert!(!StreamEvent::Token(String::new()).is_terminal());
        assert!(!StreamEvent::Sources(vec![]).is_terminal());
    }
}
