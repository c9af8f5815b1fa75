//! Per-conversation memory.
//!
//! An append-only turn log with bounded-window retrieval. Writes for the
//! same conversation are serialized through a per-conversation async
//! lock, so two near-simultaneous questions in one thread cannot
//! interleave their question/answer pairs. Different conversations never
//! contend.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::models::{ConversationTurn, Role};
use crate::store::RelationalStore;

/// Derive the deterministic conversation scope from channel and optional
/// thread key, so repeated exchanges in the same thread share memory.
pub fn conversation_id(channel_id: Option<&str>, thread_ts: Option<&str>) -> String {
    match (channel_id, thread_ts) {
        (Some(channel), Some(thread)) => format!("{}:{}", channel, thread),
        (Some(channel), None) => channel.to_string(),
        (None, _) => "direct".to_string(),
    }
}

pub struct ConversationMemory {
    store: Arc<RelationalStore>,
    window: usize,
    timeout_minutes: i64,
    max_context_chars: Option<usize>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationMemory {
    pub fn new(store: Arc<RelationalStore>, config: &MemoryConfig) -> Self {
        Self {
            store,
            window: config.window,
            timeout_minutes: config.timeout_minutes,
            max_context_chars: config.max_context_chars,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("memory lock registry poisoned");
        // A strong count of 1 means no in-flight exchange holds the
        // lock; dropping such entries keeps the registry bounded by
        // the number of active conversations.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Append a question/answer pair as two ordered turns.
    pub async fn append_exchange(
        &self,
        conversation_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;
        self.store
            .append_turns(
                conversation_id,
                &[(Role::User, question), (Role::Assistant, answer)],
            )
            .await
    }

    /// At most `limit` recent turns in chronological order (oldest
    /// first), excluding turns older than the conversation timeout.
    /// When a character budget is configured, the oldest turns are
    /// dropped first; the most recent turns always survive.
    pub async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let since = Utc::now().timestamp_millis() - self.timeout_minutes * 60_000;
        let mut turns = self
            .store
            .recent_turns(conversation_id, limit, Some(since))
            .await?;

        if let Some(budget) = self.max_context_chars {
            let mut total: usize = turns.iter().map(|t| t.content.chars().count()).sum();
            while turns.len() > 1 && total > budget {
                let dropped = turns.remove(0);
                total -= dropped.content.chars().count();
            }
        }

        Ok(turns)
    }

    /// Render turns as speaker-prefixed lines for prompt assembly.
    pub fn render(turns: &[ConversationTurn]) -> String {
        turns
            .iter()
            .map(|t| {
                let speaker = match t.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", speaker, t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
