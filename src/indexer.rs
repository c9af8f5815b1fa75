//! Document and thread indexing.
//!
//! Splits content into overlapping chunks, embeds each chunk, and
//! upserts the resulting records into the vector index before writing
//! the document row to the relational store. Record ids are
//! deterministic, so a retried or concurrent job converges on the same
//! record set instead of duplicating it.
//!
//! Jobs move through `Pending → Embedding → Stored`, or
//! `Failed(retryable)` when a provider or storage write fails after the
//! bounded retry budget, or `Failed(permanent)` for malformed input.

use std::sync::Arc;
use std::time::Duration;

use crate::chunk::{chunk_text, content_hash, record_id};
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::{DeskError, Result};
use crate::index::VectorIndex;
use crate::models::{
    ChatMessage, Document, EmbeddingRecord, FailureKind, JobResult, JobStatus, RecordMetadata,
    SourceType,
};
use crate::store::RelationalStore;

pub struct Indexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    store: Arc<RelationalStore>,
    chunking: ChunkingConfig,
    max_attempts: u32,
}

impl Indexer {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        store: Arc<RelationalStore>,
        chunking: ChunkingConfig,
        max_attempts: u32,
    ) -> Self {
        Self {
            index,
            embedder,
            store,
            chunking,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Index a document into the vector index and the relational store.
    pub async fn index_document(&self, doc: &Document) -> JobResult {
        self.run_job(SourceType::Document, None, doc).await
    }

    /// Merge a thread's messages into one logical document and index it,
    /// with `thread_ts` as the stable source id. Re-indexing the same
    /// thread after new replies replaces the prior chunk set.
    pub async fn index_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
        messages: &[ChatMessage],
    ) -> JobResult {
        if messages.is_empty() {
            return JobResult {
                source_id: thread_ts.to_string(),
                status: JobStatus::Failed(FailureKind::Permanent),
                chunks: 0,
                error: Some("thread has no messages".to_string()),
            };
        }

        let content = merge_thread_messages(messages);
        let title = thread_title(messages);
        let doc = Document {
            id: thread_ts.to_string(),
            title,
            content_hash: content_hash(&content),
            content,
            source: "thread".to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        self.run_job(SourceType::Thread, Some(channel_id), &doc).await
    }

    async fn run_job(
        &self,
        source_type: SourceType,
        channel_id: Option<&str>,
        doc: &Document,
    ) -> JobResult {
        let source_id = doc.id.clone();
        let chunks = chunk_text(&doc.content, self.chunking.max_chars, self.chunking.overlap_chars);

        if chunks.is_empty() {
            return JobResult {
                source_id,
                status: JobStatus::Failed(FailureKind::Permanent),
                chunks: 0,
                error: Some("content is empty".to_string()),
            };
        }

        // Identical content already indexed is a pure no-op: no
        // embedding calls, no writes.
        match self.already_indexed(source_type, doc).await {
            Ok(Some(existing_chunks)) => {
                tracing::debug!(source_id = %source_id, "content unchanged, skipping re-index");
                return JobResult {
                    source_id,
                    status: JobStatus::Stored,
                    chunks: existing_chunks,
                    error: None,
                };
            }
            Ok(None) => {}
            Err(e) => {
                return JobResult {
                    source_id,
                    status: JobStatus::Failed(FailureKind::Retryable),
                    chunks: 0,
                    error: Some(e.to_string()),
                };
            }
        }

        let mut last_err: Option<DeskError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = Duration::from_millis(500 * (1 << (attempt - 1).min(5)));
                tokio::time::sleep(delay).await;
            }

            match self.embed_and_store(source_type, channel_id, doc, &chunks).await {
                Ok(()) => {
                    tracing::info!(
                        source_type = source_type.as_str(),
                        source_id = %source_id,
                        chunks = chunks.len(),
                        "indexed"
                    );
                    return JobResult {
                        source_id,
                        status: JobStatus::Stored,
                        chunks: chunks.len(),
                        error: None,
                    };
                }
                Err(e @ DeskError::Validation(_)) => {
                    return JobResult {
                        source_id,
                        status: JobStatus::Failed(FailureKind::Permanent),
                        chunks: 0,
                        error: Some(e.to_string()),
                    };
                }
                Err(e) => {
                    // Provider and storage failures retry the job as a
                    // whole; the vector write is idempotent, so a retry
                    // after a partial failure converges.
                    tracing::warn!(
                        source_id = %source_id,
                        attempt,
                        error = %e,
                        "indexing attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        JobResult {
            source_id,
            status: JobStatus::Failed(FailureKind::Retryable),
            chunks: 0,
            error: last_err.map(|e| e.to_string()),
        }
    }

    /// Returns the existing chunk count when the document's content hash
    /// matches what is already indexed.
    async fn already_indexed(
        &self,
        source_type: SourceType,
        doc: &Document,
    ) -> Result<Option<usize>> {
        let existing = self.store.get_document(&doc.id).await?;
        if let Some(existing) = existing {
            if existing.content_hash == doc.content_hash {
                let count = self.index.count_for_source(source_type, &doc.id).await?;
                if count > 0 {
                    return Ok(Some(count as usize));
                }
            }
        }
        Ok(None)
    }

    async fn embed_and_store(
        &self,
        source_type: SourceType,
        channel_id: Option<&str>,
        doc: &Document,
        chunks: &[String],
    ) -> Result<()> {
        let vectors = self.embedder.embed(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(DeskError::EmbeddingProvider(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| EmbeddingRecord {
                id: record_id(source_type, &doc.id, i as i64),
                vector,
                text: text.clone(),
                metadata: RecordMetadata {
                    source_type,
                    source_id: doc.id.clone(),
                    channel_id: channel_id.map(str::to_string),
                    title: doc.title.clone(),
                    chunk_index: i as i64,
                },
            })
            .collect();

        // Vector index first, relational store second. If the second
        // write fails the whole job retries and the idempotent vector
        // write converges.
        self.index
            .replace_source(source_type, &doc.id, &records)
            .await?;
        self.store.upsert_document(doc).await?;
        Ok(())
    }
}

/// Merge thread messages into one speaker-prefixed transcript, ordered
/// by message timestamp. The canonical re-derivation from stored
/// messages means re-indexing recomputes the same content for the same
/// replies.
pub fn merge_thread_messages(messages: &[ChatMessage]) -> String {
    let mut ordered: Vec<&ChatMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| {
        let ta = a.message_ts.parse::<f64>().unwrap_or(0.0);
        let tb = b.message_ts.parse::<f64>().unwrap_or(0.0);
        ta.partial_cmp(&tb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.message_ts.cmp(&b.message_ts))
    });

    ordered
        .iter()
        .map(|m| format!("{}: {}", m.user_id, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn thread_title(messages: &[ChatMessage]) -> String {
    let first = messages
        .iter()
        .min_by(|a, b| {
            let ta = a.message_ts.parse::<f64>().unwrap_or(0.0);
            let tb = b.message_ts.parse::<f64>().unwrap_or(0.0);
            ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|m| m.text.as_str())
        .unwrap_or("");

    let snippet: String = first.chars().take(60).collect();
    if snippet.is_empty() {
        "Thread".to_string()
    } else {
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(ts: &str, user: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: 0,
            message_ts: ts.to_string(),
            channel_id: "C1".to_string(),
            user_id: user.to_string(),
            text: text.to_string(),
            thread_ts: Some("100.000".to_string()),
            created_at: 0,
        }
    }

    #[test]
    fn test_merge_orders_by_timestamp() {
        let messages = vec![
            message("100.000200", "U2", "second"),
            message("100.000100", "U1", "first"),
            message("100.000300", "U3", "third"),
        ];
        let merged = merge_thread_messages(&messages);
        assert_eq!(merged, "U1: first\nU2: second\nU3: third");
    }

    #[test]
    fn test_merge_is_canonical() {
        let a = vec![message("1.0", "U1", "q"), message("2.0", "U2", "a")];
        let b = vec![message("2.0", "U2", "a"), message("1.0", "U1", "q")];
        assert_eq!(merge_thread_messages(&a), merge_thread_messages(&b));
    }

    #[test]
    fn test_thread_title_from_first_message() {
        let messages = vec![
            message("2.0", "U2", "a long reply"),
            message("1.0", "U1", "is the API rate limited?"),
        ];
        assert_eq!(thread_title(&messages), "is the API rate limited?");
    }
}
