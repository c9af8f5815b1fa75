//! Relational store over SQLite.
//!
//! Source of truth for documents, raw chat messages, conversation turns,
//! and the answer audit trail. Message dedup relies on the
//! `UNIQUE(channel_id, message_ts)` constraint plus insert-or-ignore
//! semantics, so concurrent duplicate deliveries converge at the storage
//! layer instead of racing an application-level existence check.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{
    AnswerResponse, ChatMessage, ConversationTurn, Document, InboundEvent, Role,
};

/// Lightweight document listing row.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub source: String,
    pub created_at: i64,
}

pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ============ Chat messages ============

    /// Insert a message row, ignoring duplicates of the dedup key.
    /// Returns `true` if a row was inserted, `false` on duplicate.
    pub async fn insert_message(&self, event: &InboundEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (message_ts, channel_id, user_id, text, thread_ts, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel_id, message_ts) DO NOTHING
            "#,
        )
        .bind(&event.message_ts)
        .bind(&event.channel_id)
        .bind(&event.user_id)
        .bind(&event.text)
        .bind(&event.thread_ts)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Recent messages, newest first, optionally restricted to a channel.
    pub async fn list_messages(
        &self,
        limit: i64,
        channel_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        let rows = match channel_id {
            Some(channel) => {
                sqlx::query(
                    r#"
                    SELECT id, message_ts, channel_id, user_id, text, thread_ts, created_at
                    FROM chat_messages
                    WHERE channel_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(channel)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, message_ts, channel_id, user_id, text, thread_ts, created_at
                    FROM chat_messages
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }

    /// All messages in a thread, ordered by message timestamp.
    pub async fn thread_messages(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_ts, channel_id, user_id, text, thread_ts, created_at
            FROM chat_messages
            WHERE channel_id = ? AND (thread_ts = ? OR message_ts = ?)
            ORDER BY message_ts ASC, id ASC
            "#,
        )
        .bind(channel_id)
        .bind(thread_ts)
        .bind(thread_ts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    // ============ Documents ============

    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, source, content_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                source = excluded.source,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.source)
        .bind(&doc.content_hash)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, content, source, content_hash, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Document {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            source: row.get("source"),
            content_hash: row.get("content_hash"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, source, created_at FROM documents ORDER BY created_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentSummary {
                id: row.get("id"),
                title: row.get("title"),
                source: row.get("source"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    // ============ Conversation turns ============

    /// Append turns in order within a single transaction, so a
    /// question/answer pair can never interleave with another exchange.
    pub async fn append_turns(
        &self,
        conversation_id: &str,
        turns: &[(Role, &str)],
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for (role, content) in turns {
            sqlx::query(
                r#"
                INSERT INTO conversation_turns (conversation_id, role, content, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(conversation_id)
            .bind(role.as_str())
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Most recent turns in chronological order (oldest first).
    /// `since_ms` excludes turns older than the conversation timeout.
    pub async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
        since_ms: Option<i64>,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM conversation_turns
            WHERE conversation_id = ? AND created_at >= ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(since_ms.unwrap_or(0))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<ConversationTurn> = rows
            .iter()
            .map(|row| {
                Ok(ConversationTurn {
                    id: row.get("id"),
                    conversation_id: row.get("conversation_id"),
                    role: Role::parse(row.get::<String, _>("role").as_str())?,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                })
            })
            .collect::<Result<_>>()?;

        turns.reverse();
        Ok(turns)
    }

    // ============ Answer audit ============

    pub async fn record_answer(
        &self,
        question: &str,
        response: &AnswerResponse,
        channel_id: Option<&str>,
    ) -> Result<()> {
        let sources_json = serde_json::to_string(&response.sources)?;
        let confidence_json = serde_json::to_value(response.confidence)?;
        let confidence = confidence_json.as_str().unwrap_or("low").to_string();

        sqlx::query(
            r#"
            INSERT INTO answer_audit (question, answer, confidence, channel_id, sources_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(question)
        .bind(&response.answer)
        .bind(confidence)
        .bind(channel_id)
        .bind(sources_json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of audit rows.
    pub async fn audit_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answer_audit")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get("id"),
        message_ts: row.get("message_ts"),
        channel_id: row.get("channel_id"),
        user_id: row.get("user_id"),
        text: row.get("text"),
        thread_ts: row.get("thread_ts"),
        created_at: row.get("created_at"),
    })
}
