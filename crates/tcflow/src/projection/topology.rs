//! The topology read-model projection.
//!
//! Folds every topology event into a per-device aggregate and
//! materializes a [`TopologyView`] document under the
//! `"traffic-control"` collection, id `tc:<device>`.

use std::collections::HashMap;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::TrafficControlAggregate;
use crate::error::Result;
use crate::event::{EventRecord, TcEvent};
use crate::projection::Projection;
use crate::query::views::TopologyView;
use crate::store::ReadModelStore;

/// Read-model collection holding topology documents.
pub const TOPOLOGY_COLLECTION: &str = "traffic-control";

#[derive(Debug)]
struct DeviceState {
    aggregate: TrafficControlAggregate,
    last_failure: Option<String>,
}

/// Materializes qdiscs, classes, and filters per device.
pub struct TopologyProjection {
    store: Arc<dyn ReadModelStore>,
    states: RwLock<HashMap<String, DeviceState>>,
}

impl TopologyProjection {
    /// Create a projection writing into `store`.
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self {
            store,
            states: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Projection for TopologyProjection {
    fn name(&self) -> &str {
        "topology"
    }

    async fn handle(&self, record: &EventRecord) -> Result<()> {
        // Samples are for the time-series collector, not the topology.
        if matches!(record.payload, TcEvent::StatisticsSampled { .. }) {
            return Ok(());
        }

        // The lock is held across the save so two events for the same
        // device cannot interleave their writes.
        let mut states = self.states.write().await;
        let state = states
            .entry(record.aggregate_id.clone())
            .or_insert_with(|| DeviceState {
                aggregate: TrafficControlAggregate::new(record.payload.device().clone()),
                last_failure: None,
            });
        if let Some(reason) = record.payload.failure_reason() {
            state.last_failure = Some(reason.to_string());
        }
        // Unversioned notifications are not part of the stream and must
        // not advance the materialized version.
        if record.version > 0 {
            state.aggregate.apply(&record.payload);
        }
        let view = TopologyView::from_aggregate(&state.aggregate, state.last_failure.clone());
        let document = serde_json::to_value(view)?;

        self.store
            .save(TOPOLOGY_COLLECTION, &record.aggregate_id, document)
            .await
    }

    async fn reset(&self) -> Result<()> {
        let mut states = self.states.write().await;
        // Drop both the fold state and the materialized documents.
        for aggregate_id in states.keys() {
            match self.store.delete(TOPOLOGY_COLLECTION, aggregate_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        states.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::store::MemoryReadModelStore;
    use crate::types::{Bandwidth, DeviceName, Handle};

    fn record(version: u64, payload: TcEvent) -> EventRecord {
        EventRecord {
            aggregate_id: "tc:eth0".into(),
            version,
            timestamp: Utc::now(),
            payload,
        }
    }

    fn dev() -> DeviceName {
        DeviceName::new("eth0").unwrap()
    }

    #[tokio::test]
    async fn test_materializes_topology_document() {
        let store = Arc::new(MemoryReadModelStore::new());
        let projection = TopologyProjection::new(store.clone());

        projection
            .handle(&record(
                1,
                TcEvent::HtbQdiscCreated {
                    device: dev(),
                    handle: Handle::root(1).unwrap(),
                    default_class: Handle::new(1, 999).unwrap(),
                    r2q: 10,
                    link_bandwidth: Some(Bandwidth::megabits(10)),
                },
            ))
            .await
            .unwrap();

        let doc = store.get(TOPOLOGY_COLLECTION, "tc:eth0").await.unwrap();
        assert_eq!(doc["device"], "eth0");
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["qdiscs"][0]["kind"], "htb");
    }

    #[tokio::test]
    async fn test_apply_failure_is_recorded_in_the_view() {
        let store = Arc::new(MemoryReadModelStore::new());
        let projection = TopologyProjection::new(store.clone());

        projection
            .handle(&record(
                1,
                TcEvent::QdiscApplyFailed {
                    device: dev(),
                    handle: Handle::root(1).unwrap(),
                    reason: "Operation not permitted".into(),
                },
            ))
            .await
            .unwrap();

        let doc = store.get(TOPOLOGY_COLLECTION, "tc:eth0").await.unwrap();
        assert_eq!(doc["last_apply_failure"], "Operation not permitted");
    }

    #[tokio::test]
    async fn test_reset_removes_documents() {
        let store = Arc::new(MemoryReadModelStore::new());
        let projection = TopologyProjection::new(store.clone());

        projection
            .handle(&record(
                1,
                TcEvent::QdiscDeleted {
                    device: dev(),
                    handle: Handle::root(1).unwrap(),
                },
            ))
            .await
            .unwrap();
        projection.reset().await.unwrap();
        assert!(store.get(TOPOLOGY_COLLECTION, "tc:eth0").await.unwrap_err().is_not_found());
    }
}
