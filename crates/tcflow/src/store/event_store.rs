//! Append-only event streams with optimistic concurrency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{EventRecord, TcEvent};

/// Append-only storage for aggregate event streams.
///
/// Implementations must make `append` atomic per aggregate: the
/// expected-version check and the write happen under one critical
/// section, so two racing writers produce exactly one winner and one
/// [`Error::ConcurrencyConflict`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a stream iff its current version equals
    /// `expected_version`. Assigns sequential versions starting at
    /// `expected_version + 1` and returns the persisted records.
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<TcEvent>,
    ) -> Result<Vec<EventRecord>>;

    /// All events of one aggregate, ordered by version, oldest first.
    async fn events_for(&self, aggregate_id: &str) -> Result<Vec<EventRecord>>;

    /// Every event in the store, ordered by (aggregate id, version).
    /// Projections rebuild from this.
    async fn all_events(&self) -> Result<Vec<EventRecord>>;
}

/// In-memory reference event store.
///
/// Streams live in a `BTreeMap` keyed by aggregate id so `all_events`
/// comes out in (aggregate id, version) order without sorting. The
/// read/write lock admits concurrent readers and serializes writers,
/// which is what makes the expected-version check race-free.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    streams: RwLock<BTreeMap<String, Vec<EventRecord>>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<TcEvent>,
    ) -> Result<Vec<EventRecord>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id.to_string()).or_default();
        let current = stream.len() as u64;
        if current != expected_version {
            return Err(Error::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual: current,
            });
        }
        let now = Utc::now();
        let mut appended = Vec::with_capacity(events.len());
        for (i, payload) in events.into_iter().enumerate() {
            let record = EventRecord {
                aggregate_id: aggregate_id.to_string(),
                version: current + i as u64 + 1,
                timestamp: now,
                payload,
            };
            stream.push(record.clone());
            appended.push(record);
        }
        debug!(
            aggregate_id,
            from = expected_version,
            to = stream.len(),
            "appended events"
        );
        Ok(appended)
    }

    async fn events_for(&self, aggregate_id: &str) -> Result<Vec<EventRecord>> {
        let streams = self.streams.read().await;
        Ok(streams.get(aggregate_id).cloned().unwrap_or_default())
    }

    async fn all_events(&self) -> Result<Vec<EventRecord>> {
        let streams = self.streams.read().await;
        Ok(streams.values().flatten().cloned().collect())
    }
}
