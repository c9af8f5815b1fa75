//! Inbound event ingestion.
//!
//! Every chat event passes through [`EventIngestor::ingest`] before any
//! other work happens. The insert-or-ignore on `(channel_id, message_ts)`
//! is the single mechanism preventing double-indexing or double-answering
//! under at-least-once delivery from the transport: a replayed event is
//! reported as a duplicate and performs no further work. Questions are
//! deliberately not deduplicated by content — a legitimately repeated
//! question arrives with a fresh `message_ts` and is always answered.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{DeskError, Result};
use crate::models::InboundEvent;
use crate::store::RelationalStore;

/// Why an event was or was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestReason {
    Accepted,
    Duplicate,
}

/// Outcome of ingesting one inbound event.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub reason: IngestReason,
}

pub struct EventIngestor {
    store: Arc<RelationalStore>,
}

impl EventIngestor {
    pub fn new(store: Arc<RelationalStore>) -> Self {
        Self { store }
    }

    /// Deduplicate and persist an inbound event.
    ///
    /// Malformed events (missing dedup key fields) are rejected with a
    /// validation error and never stored. Duplicates return
    /// `accepted=false` and are logged, never surfaced to the user.
    pub async fn ingest(&self, event: &InboundEvent) -> Result<IngestOutcome> {
        if event.message_ts.trim().is_empty() {
            return Err(DeskError::Validation(
                "event message_ts must not be empty".to_string(),
            ));
        }
        if event.channel_id.trim().is_empty() {
            return Err(DeskError::Validation(
                "event channel_id must not be empty".to_string(),
            ));
        }

        let inserted = self.store.insert_message(event).await?;
        if inserted {
            tracing::debug!(
                channel = %event.channel_id,
                ts = %event.message_ts,
                "event accepted"
            );
            Ok(IngestOutcome {
                accepted: true,
                reason: IngestReason::Accepted,
            })
        } else {
            tracing::info!(
                channel = %event.channel_id,
                ts = %event.message_ts,
                "duplicate event ignored"
            );
            Ok(IngestOutcome {
                accepted: false,
                reason: IngestReason::Duplicate,
            })
        }
    }
}
