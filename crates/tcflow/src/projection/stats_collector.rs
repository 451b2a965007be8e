//! The time-series collector projection.
//!
//! Writes every statistics sample that crosses the event bus into the
//! time-series store. All other events are ignored.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::{EventRecord, TcEvent};
use crate::projection::Projection;
use crate::store::TimeSeriesStore;

/// Stores `StatisticsSampled` payloads per device.
pub struct StatsCollector {
    store: Arc<dyn TimeSeriesStore>,
}

impl StatsCollector {
    /// Create a collector writing into `store`.
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Projection for StatsCollector {
    fn name(&self) -> &str {
        "timeseries-stats"
    }

    async fn handle(&self, record: &EventRecord) -> Result<()> {
        if let TcEvent::StatisticsSampled { device, sample } = &record.payload {
            self.store.store(device, sample.clone()).await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        // Samples are history, not derived state; they are not rebuilt
        // from topology events and survive a projection rebuild.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::stats::sample::RawSample;
    use crate::store::MemoryTimeSeriesStore;
    use crate::types::{DeviceName, Handle};

    #[tokio::test]
    async fn test_samples_land_in_the_store() {
        let store = Arc::new(MemoryTimeSeriesStore::new());
        let collector = StatsCollector::new(store.clone());
        let device = DeviceName::new("eth0").unwrap();
        let now = Utc::now();

        collector
            .handle(&EventRecord::notification(TcEvent::StatisticsSampled {
                device: device.clone(),
                sample: RawSample::empty(now),
            }))
            .await
            .unwrap();

        let samples = store
            .query(&device, now - Duration::minutes(1), now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let store = Arc::new(MemoryTimeSeriesStore::new());
        let collector = StatsCollector::new(store.clone());

        collector
            .handle(&EventRecord::notification(TcEvent::QdiscDeleted {
                device: DeviceName::new("eth0").unwrap(),
                handle: Handle::root(1).unwrap(),
            }))
            .await
            .unwrap();

        assert_eq!(store.storage_stats().await.unwrap().raw_samples, 0);
    }
}
