//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the persistence seam for semantic search,
//! with two backends: [`SqliteVectorIndex`] (BLOB-encoded vectors in the
//! main database, cosine similarity computed in Rust) and
//! [`MemoryVectorIndex`] (a `HashMap`-backed store used in tests and
//! embeddable setups).
//!
//! Query scores are normalized to `[0, 1]` (higher = more similar) so
//! downstream confidence labeling can reason about them numerically
//! regardless of the underlying distance metric.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::embedding::{blob_to_vec, cosine_similarity, normalized_similarity, vec_to_blob};
use crate::error::{DeskError, Result};
use crate::models::{EmbeddingRecord, RecordMetadata, SourceType};

/// Metadata filter applied at query time.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Exclude thread records from other channels. Records with no
    /// channel (documents) always match.
    pub channel_id: Option<String>,
}

/// A ranked query result.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    /// Normalized similarity in `[0, 1]`.
    pub score: f64,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// Nearest-neighbor store for embedding records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records by id.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()>;

    /// Atomically replace every record belonging to a source with the
    /// given set. A re-index that produces fewer chunks must not leave
    /// stale trailing records behind.
    async fn replace_source(
        &self,
        source_type: SourceType,
        source_id: &str,
        records: &[EmbeddingRecord],
    ) -> Result<()>;

    /// Ranked nearest-neighbor query.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredRecord>>;

    /// Number of records currently stored for a source.
    async fn count_for_source(&self, source_type: SourceType, source_id: &str) -> Result<u64>;
}

fn validate_records(
    source_type: SourceType,
    source_id: &str,
    records: &[EmbeddingRecord],
) -> Result<()> {
    for record in records {
        record.metadata.validate()?;
        if record.metadata.source_type != source_type || record.metadata.source_id != source_id {
            return Err(DeskError::Validation(format!(
                "record {} does not belong to {} {}",
                record.id,
                source_type.as_str(),
                source_id
            )));
        }
    }
    Ok(())
}

fn matches_filter(metadata: &RecordMetadata, filter: &QueryFilter) -> bool {
    match (&filter.channel_id, &metadata.channel_id) {
        (Some(wanted), Some(channel)) => wanted == channel,
        _ => true,
    }
}

fn rank(mut results: Vec<ScoredRecord>, top_k: usize) -> Vec<ScoredRecord> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(top_k);
    results
}

// ============ SQLite backend ============

/// Vector index stored in the `embedding_records` table.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    model: String,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, model: impl Into<String>) -> Self {
        Self {
            pool,
            model: model.into(),
        }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<(Vec<f32>, ScoredRecord)> {
        let blob: Vec<u8> = row.get("embedding");
        let source_type = SourceType::parse(row.get::<String, _>("source_type").as_str())?;
        let metadata = RecordMetadata {
            source_type,
            source_id: row.get("source_id"),
            channel_id: row.get("channel_id"),
            title: row.get("title"),
            chunk_index: row.get("chunk_index"),
        };
        Ok((
            blob_to_vec(&blob),
            ScoredRecord {
                id: row.get("id"),
                score: 0.0,
                text: row.get("text"),
                metadata,
            },
        ))
    }

    async fn insert_all(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO embedding_records
                    (id, embedding, source_type, source_id, channel_id, title, chunk_index, text, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    channel_id = excluded.channel_id,
                    title = excluded.title,
                    text = excluded.text,
                    model = excluded.model
                "#,
            )
            .bind(&record.id)
            .bind(vec_to_blob(&record.vector))
            .bind(record.metadata.source_type.as_str())
            .bind(&record.metadata.source_id)
            .bind(&record.metadata.channel_id)
            .bind(&record.metadata.title)
            .bind(record.metadata.chunk_index)
            .bind(&record.text)
            .bind(&self.model)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        for record in records {
            record.metadata.validate()?;
        }
        let mut tx = self.pool.begin().await?;
        self.insert_all(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_source(
        &self,
        source_type: SourceType,
        source_id: &str,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        validate_records(source_type, source_id, records)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM embedding_records WHERE source_type = ? AND source_id = ?")
            .bind(source_type.as_str())
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        self.insert_all(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, embedding, source_type, source_id, channel_id, title, chunk_index, text
            FROM embedding_records
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for row in &rows {
            let (stored, mut record) = Self::row_to_record(row)?;
            if !matches_filter(&record.metadata, filter) {
                continue;
            }
            record.score = normalized_similarity(cosine_similarity(vector, &stored));
            results.push(record);
        }

        Ok(rank(results, top_k))
    }

    async fn count_for_source(&self, source_type: SourceType, source_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM embedding_records WHERE source_type = ? AND source_id = ?",
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

// ============ In-memory backend ============

/// `HashMap`-backed vector index with the same semantics as the SQLite
/// backend. Used by the test suite and embeddable setups.
#[derive(Default)]
pub struct MemoryVectorIndex {
    records: Mutex<HashMap<String, EmbeddingRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        for record in records {
            record.metadata.validate()?;
        }
        let mut map = self.records.lock().expect("vector index lock poisoned");
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn replace_source(
        &self,
        source_type: SourceType,
        source_id: &str,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        validate_records(source_type, source_id, records)?;
        let mut map = self.records.lock().expect("vector index lock poisoned");
        map.retain(|_, r| {
            !(r.metadata.source_type == source_type && r.metadata.source_id == source_id)
        });
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredRecord>> {
        let map = self.records.lock().expect("vector index lock poisoned");
        let results = map
            .values()
            .filter(|r| matches_filter(&r.metadata, filter))
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: normalized_similarity(cosine_similarity(vector, &r.vector)),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();
        Ok(rank(results, top_k))
    }

    async fn count_for_source(&self, source_type: SourceType, source_id: &str) -> Result<u64> {
        let map = self.records.lock().expect("vector index lock poisoned");
        Ok(map
            .values()
            .filter(|r| r.metadata.source_type == source_type && r.metadata.source_id == source_id)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::record_id;

    fn record(source_id: &str, chunk_index: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: record_id(SourceType::Document, source_id, chunk_index),
            vector,
            text: format!("chunk {} of {}", chunk_index, source_id),
            metadata: RecordMetadata {
                source_type: SourceType::Document,
                source_id: source_id.to_string(),
                channel_id: None,
                title: source_id.to_string(),
                chunk_index,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = MemoryVectorIndex::new();
        index.upsert(&[record("d1", 0, vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[record("d1", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.count_for_source(SourceType::Document, "d1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_source_drops_stale_records() {
        let index = MemoryVectorIndex::new();
        index
            .replace_source(
                SourceType::Document,
                "d1",
                &[record("d1", 0, vec![1.0, 0.0]), record("d1", 1, vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        index
            .replace_source(SourceType::Document, "d1", &[record("d1", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.count_for_source(SourceType::Document, "d1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_source_rejects_foreign_records() {
        let index = MemoryVectorIndex::new();
        let result = index
            .replace_source(SourceType::Document, "d1", &[record("d2", 0, vec![1.0])])
            .await;
        assert!(matches!(result, Err(DeskError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&[
                record("near", 0, vec![1.0, 0.0]),
                record("far", 0, vec![-1.0, 0.0]),
                record("mid", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index
            .query(&[1.0, 0.0], 3, &QueryFilter::default())
            .await
            .unwrap();
        assert_eq!(results[0].metadata.source_id, "near");
        assert_eq!(results[2].metadata.source_id, "far");
        assert!(results[0].score > results[1].score);
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score));
        }
    }

    #[tokio::test]
    async fn test_query_channel_filter_scopes_thread_records() {
        let index = MemoryVectorIndex::new();
        let mut in_channel = record("t1", 0, vec![1.0, 0.0]);
        in_channel.metadata.channel_id = Some("C1".to_string());
        let mut elsewhere = record("t2", 0, vec![1.0, 0.0]);
        elsewhere.metadata.channel_id = Some("C2".to_string());
        let global_doc = record("d1", 0, vec![1.0, 0.0]);
        index.upsert(&[in_channel, elsewhere, global_doc]).await.unwrap();

        let filter = QueryFilter {
            channel_id: Some("C1".to_string()),
        };
        let results = index.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.metadata.source_id.as_str()).collect();
        // Channel-scoped thread material plus channel-less documents;
        // never another channel's threads.
        assert!(ids.contains(&"t1"));
        assert!(ids.contains(&"d1"));
        assert!(!ids.contains(&"t2"));
    }

    #[tokio::test]
    async fn test_query_top_k_bound() {
        let index = MemoryVectorIndex::new();
        let records: Vec<_> = (0..10).map(|i| record("d1", i, vec![1.0, i as f32])).collect();
        index.upsert(&records).await.unwrap();
        let results = index
            .query(&[1.0, 0.0], 4, &QueryFilter::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
    }
}
