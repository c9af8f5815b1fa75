//! Service wiring.
//!
//! All long-lived handles (pool, vector index, providers) are
//! constructed once here and injected into the components that need
//! them. Nothing in the crate reaches for ambient global state.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::engine::AnswerEngine;
use crate::error::Result;
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::indexer::Indexer;
use crate::ingest::EventIngestor;
use crate::llm::{create_generator, Generator};
use crate::memory::ConversationMemory;
use crate::store::RelationalStore;

/// The assembled service graph.
pub struct App {
    pub store: Arc<RelationalStore>,
    pub memory: Arc<ConversationMemory>,
    pub ingestor: Arc<EventIngestor>,
    pub indexer: Arc<Indexer>,
    pub engine: Arc<AnswerEngine>,
}

impl App {
    /// Build with providers selected from configuration.
    pub fn build(config: &Config, pool: SqlitePool) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.llm)?;
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            config.embedding.model.clone(),
        ));
        Ok(Self::assemble(config, pool, index, embedder, generator))
    }

    /// Build with explicitly supplied collaborators, for embedding in
    /// other binaries and for tests.
    pub fn assemble(
        config: &Config,
        pool: SqlitePool,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let store = Arc::new(RelationalStore::new(pool));
        let memory = Arc::new(ConversationMemory::new(store.clone(), &config.memory));
        let ingestor = Arc::new(EventIngestor::new(store.clone()));
        let indexer = Arc::new(Indexer::new(
            index.clone(),
            embedder.clone(),
            store.clone(),
            config.chunking.clone(),
            config.embedding.max_retries,
        ));
        let engine = Arc::new(AnswerEngine::new(
            index,
            embedder,
            generator,
            memory.clone(),
            store.clone(),
            config.retrieval.clone(),
        ));

        Self {
            store,
            memory,
            ingestor,
            indexer,
            engine,
        }
    }
}
