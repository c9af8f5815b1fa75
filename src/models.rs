//! Core data models used throughout the answering pipeline.
//!
//! These types represent the documents, chat messages, conversation turns,
//! and embedding records that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

/// A knowledge-base document. Immutable once indexed; a content change
/// produces a new `content_hash` and triggers re-indexing of the same id.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub content_hash: String,
    pub created_at: i64,
}

impl Document {
    /// New document with a fresh id and a content hash derived from the
    /// body.
    pub fn new(title: impl Into<String>, content: impl Into<String>, source: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content_hash: crate::chunk::content_hash(&content),
            content,
            source: source.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A stored chat message. `(channel_id, message_ts)` is the dedup key.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub message_ts: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub thread_ts: Option<String>,
    pub created_at: i64,
}

/// Speaker role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(DeskError::Storage(format!("unknown role: {}", other))),
        }
    }
}

/// One message in a conversation's append-only history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

/// Origin of an embedding record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Document,
    Thread,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Thread => "thread",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "document" => Ok(SourceType::Document),
            "thread" => Ok(SourceType::Thread),
            other => Err(DeskError::Storage(format!("unknown source_type: {}", other))),
        }
    }
}

/// Typed metadata attached to every vector-index record.
///
/// Validated at write time so malformed records never reach the index.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    pub source_type: SourceType,
    pub source_id: String,
    pub channel_id: Option<String>,
    pub title: String,
    pub chunk_index: i64,
}

impl RecordMetadata {
    pub fn validate(&self) -> Result<()> {
        if self.source_id.trim().is_empty() {
            return Err(DeskError::Validation(
                "embedding record source_id must not be empty".to_string(),
            ));
        }
        if self.chunk_index < 0 {
            return Err(DeskError::Validation(format!(
                "embedding record chunk_index must be >= 0, got {}",
                self.chunk_index
            )));
        }
        Ok(())
    }
}

/// A record stored in the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// Whether a failed indexing job is worth re-attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    Permanent,
}

/// Per-source indexing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Embedding,
    Stored,
    Failed(FailureKind),
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Embedding => "embedding",
            JobStatus::Stored => "stored",
            JobStatus::Failed(FailureKind::Retryable) => "failed_retryable",
            JobStatus::Failed(FailureKind::Permanent) => "failed_permanent",
        }
    }
}

/// Outcome of an indexing job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub source_id: String,
    pub status: JobStatus,
    pub chunks: usize,
    pub error: Option<String>,
}

/// How well-grounded a generated answer is in retrieved context.
///
/// Variant order matters: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A source reference backing a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub source_type: SourceType,
}

/// Response returned by the answer engine.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
}

/// Kind of a normalized inbound chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Mention,
    Dm,
    SlashCommand,
    Reaction,
}

impl EventKind {
    /// Mentions, DMs, and slash commands all carry a question to answer;
    /// reactions are stored but never answered.
    pub fn is_question(&self) -> bool {
        matches!(self, EventKind::Mention | EventKind::Dm | EventKind::SlashCommand)
    }
}

/// A normalized inbound chat event as delivered by the transport.
///
/// `message_ts` may be omitted by transports that do not carry their
/// own timestamps; [`InboundEvent::fill_default_ts`] assigns one at
/// intake so the dedup key is always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub message_ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl InboundEvent {
    /// Assign the current time as `secs.micros` when the transport
    /// supplied no timestamp. Events that already carry one are left
    /// untouched.
    pub fn fill_default_ts(&mut self) {
        if self.message_ts.trim().is_empty() {
            let now = chrono::Utc::now();
            self.message_ts = format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn test_question_kinds() {
        assert!(EventKind::Mention.is_question());
        assert!(EventKind::Dm.is_question());
        assert!(EventKind::SlashCommand.is_question());
        assert!(!EventKind::Reaction.is_question());
    }

    #[test]
    fn test_metadata_rejects_empty_source_id() {
        let meta = RecordMetadata {
            source_type: SourceType::Document,
            source_id: "  ".to_string(),
            channel_id: None,
            title: "t".to_string(),
            chunk_index: 0,
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_event_kind_wire_names() {
        let ev: InboundEvent = serde_json::from_str(
            r#"{"type":"slash_command","channel_id":"C1","user_id":"U1","text":"hi","message_ts":"1.0"}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, EventKind::SlashCommand);
        assert!(ev.thread_ts.is_none());
    }

    #[test]
    fn test_event_without_ts_gets_default_on_fill() {
        let mut ev: InboundEvent = serde_json::from_str(
            r#"{"type":"mention","channel_id":"C1","user_id":"U1","text":"hi"}"#,
        )
        .unwrap();
        assert!(ev.message_ts.is_empty());

        ev.fill_default_ts();
        let (secs, micros) = ev.message_ts.split_once('.').unwrap();
        assert!(secs.parse::<i64>().unwrap() > 0);
        assert_eq!(micros.len(), 6);
        assert!(micros.parse::<u32>().is_ok());
    }

    #[test]
    fn test_fill_default_ts_keeps_supplied_ts() {
        let mut ev: InboundEvent = serde_json::from_str(
            r#"{"type":"mention","channel_id":"C1","user_id":"U1","text":"hi","message_ts":"1700000000.000123"}"#,
        )
        .unwrap();
        ev.fill_default_ts();
        assert_eq!(ev.message_ts, "1700000000.000123");
    }
}
