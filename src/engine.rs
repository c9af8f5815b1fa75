//! The answer engine.
//!
//! Orchestrates the question path: embed the question, retrieve the
//! nearest chunks, fetch recent conversation turns, assemble the prompt,
//! generate, label confidence from the retrieval score distribution, and
//! persist the exchange plus an audit record.
//!
//! The user-facing contract guarantees a response: an empty knowledge
//! base answers from general knowledge at low confidence, and a
//! generation failure after retries degrades to a canned apology rather
//! than an error.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{DeskError, Result};
use crate::index::{QueryFilter, ScoredRecord, VectorIndex};
use crate::llm::Generator;
use crate::memory::{conversation_id, ConversationMemory};
use crate::models::{AnswerResponse, Confidence, ConversationTurn, SourceRef};
use crate::store::RelationalStore;

const SYSTEM_INSTRUCTION: &str = "You are a helpful support assistant. \
Use the following context from indexed documents and chat threads to answer the question. \
Cite the sources you used. If you cannot find the answer in the context, \
say so and provide general guidance.";

const FALLBACK_ANSWER: &str = "Sorry, I couldn't generate an answer right now. \
Please try asking again in a moment.";

pub struct AnswerEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    memory: Arc<ConversationMemory>,
    store: Arc<RelationalStore>,
    retrieval: RetrievalConfig,
}

impl AnswerEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        memory: Arc<ConversationMemory>,
        store: Arc<RelationalStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            memory,
            store,
            retrieval,
        }
    }

    /// Answer a question, optionally scoped to a channel.
    pub async fn answer(
        &self,
        question: &str,
        channel_id: Option<&str>,
    ) -> Result<AnswerResponse> {
        self.answer_in_thread(question, channel_id, None).await
    }

    /// Answer within a specific thread so follow-ups share memory.
    pub async fn answer_in_thread(
        &self,
        question: &str,
        channel_id: Option<&str>,
        thread_ts: Option<&str>,
    ) -> Result<AnswerResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DeskError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let conversation = conversation_id(channel_id, thread_ts);

        // A retrieval-side provider failure degrades to the no-context
        // path instead of surfacing; storage failures stay fatal.
        let retrieved = match self.retrieve(question, channel_id).await {
            Ok(records) => records,
            Err(e @ DeskError::Storage(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "retrieval degraded, answering without context");
                Vec::new()
            }
        };

        let history = self.memory.recent(&conversation, self.memory.window()).await?;
        let prompt = build_prompt(&retrieved, &history, question);

        let (answer, degraded) = match self.generator.complete(&prompt).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, returning fallback answer");
                (FALLBACK_ANSWER.to_string(), true)
            }
        };

        let confidence = if degraded {
            Confidence::Low
        } else {
            confidence_label(
                retrieved.first().map(|r| r.score),
                self.retrieval.high_threshold,
                self.retrieval.medium_threshold,
            )
        };

        let response = AnswerResponse {
            answer,
            sources: source_refs(&retrieved),
            confidence,
        };

        // Record the exchange even when degraded, so the conversation
        // stays coherent.
        self.memory
            .append_exchange(&conversation, question, &response.answer)
            .await?;
        self.store
            .record_answer(question, &response, channel_id)
            .await?;

        tracing::info!(
            conversation = %conversation,
            sources = response.sources.len(),
            confidence = ?response.confidence,
            "answered question"
        );

        Ok(response)
    }

    async fn retrieve(
        &self,
        question: &str,
        channel_id: Option<&str>,
    ) -> Result<Vec<ScoredRecord>> {
        let vectors = self.embedder.embed(&[question.to_string()]).await?;
        let query_vec = vectors.into_iter().next().ok_or_else(|| {
            DeskError::EmbeddingProvider("empty embedding response".to_string())
        })?;

        let filter = QueryFilter {
            channel_id: channel_id.map(str::to_string),
        };
        self.index
            .query(&query_vec, self.retrieval.top_k, &filter)
            .await
    }
}

/// Label confidence from the top retrieval score. `None` (no retrieved
/// context) is always `low`.
fn confidence_label(top_score: Option<f64>, high: f64, medium: f64) -> Confidence {
    match top_score {
        Some(score) if score >= high => Confidence::High,
        Some(score) if score >= medium => Confidence::Medium,
        _ => Confidence::Low,
    }
}

/// Deduplicate retrieved chunks into per-source references, preserving
/// rank order.
fn source_refs(retrieved: &[ScoredRecord]) -> Vec<SourceRef> {
    let mut refs: Vec<SourceRef> = Vec::new();
    for record in retrieved {
        if refs.iter().any(|r| {
            r.id == record.metadata.source_id && r.source_type == record.metadata.source_type
        }) {
            continue;
        }
        refs.push(SourceRef {
            id: record.metadata.source_id.clone(),
            title: record.metadata.title.clone(),
            source_type: record.metadata.source_type,
        });
    }
    refs
}

fn build_prompt(
    retrieved: &[ScoredRecord],
    history: &[ConversationTurn],
    question: &str,
) -> String {
    let mut prompt = String::from(SYSTEM_INSTRUCTION);
    prompt.push_str("\n\nContext:\n");

    if retrieved.is_empty() {
        prompt.push_str("(no relevant context found)\n");
    } else {
        for record in retrieved {
            prompt.push_str(&format!(
                "From {} ({}):\n{}\n\n",
                record.metadata.source_type.as_str(),
                record.metadata.title,
                record.text
            ));
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(&ConversationMemory::render(history));
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nQuestion: {}\n\nAnswer:", question));
    prompt
}
