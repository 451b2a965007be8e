//! Statistics service: configured topology joined with live counters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::kernel::KernelAdapter;
use crate::projection::TOPOLOGY_COLLECTION;
use crate::query::views::TopologyView;
use crate::stats::sample::{
    ClassCounters, DetailedStats, FilterMatchCounters, LinkCounters, QdiscCounters, RawSample,
};
use crate::store::ReadModelStore;
use crate::types::{Bandwidth, DeviceName, Handle};

/// Counters and detail for one configured qdisc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdiscStatistics {
    /// Qdisc handle.
    pub handle: Handle,
    /// Scheduler name.
    pub kind: String,
    /// Live counters, when the kernel reports this handle.
    pub counters: Option<QdiscCounters>,
    /// Detailed block, when available.
    pub detailed: Option<DetailedStats>,
}

/// Counters and detail for one configured class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    /// Class handle.
    pub handle: Handle,
    /// Human-readable name from the configuration.
    pub name: String,
    /// Configured priority.
    pub priority: u8,
    /// Configured guaranteed rate.
    pub rate: Bandwidth,
    /// Configured ceiling.
    pub ceil: Bandwidth,
    /// Live counters, when the kernel reports this handle.
    pub counters: Option<ClassCounters>,
    /// Detailed block, when available.
    pub detailed: Option<DetailedStats>,
}

/// Configured view of one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStatistics {
    /// The classifying qdisc.
    pub parent: Handle,
    /// Filter priority.
    pub priority: u16,
    /// Classified protocol.
    pub protocol: String,
    /// Target class.
    pub flow_id: Handle,
    /// Number of match predicates.
    pub match_count: usize,
}

/// Joined statistics for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatistics {
    /// Interface name.
    pub device: String,
    /// When the counters were read.
    pub timestamp: DateTime<Utc>,
    /// Interface totals.
    pub link: LinkCounters,
    /// Per-qdisc statistics.
    pub qdiscs: Vec<QdiscStatistics>,
    /// Per-class statistics.
    pub classes: Vec<ClassStatistics>,
    /// Configured filter views.
    pub filters: Vec<FilterStatistics>,
}

/// Exactly what the kernel reports, no read model involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeStatistics {
    /// Interface name.
    pub device: String,
    /// When the counters were read.
    pub timestamp: DateTime<Utc>,
    /// Interface totals.
    pub link: LinkCounters,
    /// Per-qdisc counters.
    pub qdiscs: Vec<QdiscCounters>,
    /// Per-class counters.
    pub classes: Vec<ClassCounters>,
    /// Per-filter match counts.
    pub filters: Vec<FilterMatchCounters>,
}

/// Merges the configured topology with live kernel counters.
pub struct StatisticsService {
    read_models: Arc<dyn ReadModelStore>,
    adapter: Arc<dyn KernelAdapter>,
}

impl StatisticsService {
    /// Wire the service over its collaborators.
    pub fn new(read_models: Arc<dyn ReadModelStore>, adapter: Arc<dyn KernelAdapter>) -> Self {
        Self {
            read_models,
            adapter,
        }
    }

    /// Configured topology joined by handle with live counters.
    ///
    /// A missing read model is not an error; the join proceeds with an
    /// empty baseline and reports only link totals.
    pub async fn device_statistics(&self, device: &DeviceName) -> Result<DeviceStatistics> {
        let topology = self.topology(device).await?;

        let link = self.adapter.link_stats(device).await?;
        let qdisc_counters: HashMap<Handle, QdiscCounters> = self
            .adapter
            .qdiscs(device)
            .await?
            .into_iter()
            .map(|c| (c.handle, c))
            .collect();
        let class_counters: HashMap<Handle, ClassCounters> = self
            .adapter
            .classes(device)
            .await?
            .into_iter()
            .map(|c| (c.handle, c))
            .collect();

        let mut qdiscs = Vec::new();
        let mut classes = Vec::new();
        let mut filters = Vec::new();
        if let Some(view) = &topology {
            for qdisc in &view.qdiscs {
                let detailed = self
                    .adapter
                    .detailed_qdisc_stats(device, qdisc.handle)
                    .await
                    .ok();
                qdiscs.push(QdiscStatistics {
                    handle: qdisc.handle,
                    kind: qdisc.kind.clone(),
                    counters: qdisc_counters.get(&qdisc.handle).cloned(),
                    detailed,
                });
            }
            for class in &view.classes {
                let detailed = self
                    .adapter
                    .detailed_class_stats(device, class.handle)
                    .await
                    .ok();
                classes.push(ClassStatistics {
                    handle: class.handle,
                    name: class.name.clone(),
                    priority: class.priority,
                    rate: class.rate,
                    ceil: class.ceil,
                    counters: class_counters.get(&class.handle).cloned(),
                    detailed,
                });
            }
            for filter in &view.filters {
                filters.push(FilterStatistics {
                    parent: filter.parent,
                    priority: filter.priority,
                    protocol: filter.protocol.clone(),
                    flow_id: filter.flow_id,
                    match_count: filter.matches.len(),
                });
            }
        }

        Ok(DeviceStatistics {
            device: device.as_str().to_string(),
            timestamp: Utc::now(),
            link,
            qdiscs,
            classes,
            filters,
        })
    }

    /// Live counters straight from the kernel, bypassing the read model.
    pub async fn realtime_statistics(&self, device: &DeviceName) -> Result<RealtimeStatistics> {
        Ok(RealtimeStatistics {
            device: device.as_str().to_string(),
            timestamp: Utc::now(),
            link: self.adapter.link_stats(device).await?,
            qdiscs: self.adapter.qdiscs(device).await?,
            classes: self.adapter.classes(device).await?,
            filters: self.adapter.filters(device).await?,
        })
    }

    /// One raw sample for the time-series store.
    pub async fn sample(&self, device: &DeviceName) -> Result<RawSample> {
        let realtime = self.realtime_statistics(device).await?;
        Ok(RawSample {
            timestamp: realtime.timestamp,
            link: realtime.link,
            qdiscs: realtime.qdiscs,
            classes: realtime.classes,
            filters: realtime.filters,
        })
    }

    async fn topology(&self, device: &DeviceName) -> Result<Option<TopologyView>> {
        match self
            .read_models
            .get(TOPOLOGY_COLLECTION, &device.aggregate_id())
            .await
        {
            Ok(doc) => Ok(Some(serde_json::from_value(doc)?)),
            Err(err) if err.is_not_found() => {
                debug!(device = device.as_str(), "no configured topology, empty baseline");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryReadModelStore;
    use crate::kernel::MemoryAdapter;
    use crate::domain::{Class, ClassKind, HtbClassParams};
    use crate::types::Priority;

    fn dev() -> DeviceName {
        DeviceName::new("eth0").unwrap()
    }

    fn h(s: &str) -> Handle {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_missing_read_model_yields_empty_baseline() {
        let service = StatisticsService::new(
            Arc::new(MemoryReadModelStore::new()),
            Arc::new(MemoryAdapter::new()),
        );
        let stats = service.device_statistics(&dev()).await.unwrap();
        assert_eq!(stats.device, "eth0");
        assert!(stats.qdiscs.is_empty());
        assert!(stats.classes.is_empty());
        assert!(stats.filters.is_empty());
    }

    #[tokio::test]
    async fn test_join_attaches_counters_to_configured_classes() {
        let read_models = Arc::new(MemoryReadModelStore::new());
        let adapter = Arc::new(MemoryAdapter::new());

        // Configured view with one class...
        let view = serde_json::json!({
            "device": "eth0",
            "version": 2,
            "qdiscs": [],
            "classes": [{
                "handle": "1:10",
                "parent": "1:0",
                "name": "web",
                "priority": 1,
                "rate": "2mbit",
                "ceil": "5mbit",
            }],
            "filters": [],
        });
        read_models
            .save(TOPOLOGY_COLLECTION, "tc:eth0", view)
            .await
            .unwrap();

        // ...and matching kernel state with traffic.
        let class = Class {
            device: dev(),
            handle: h("1:10"),
            parent: h("1:0"),
            name: "web".into(),
            priority: Priority::new(1).unwrap(),
            kind: ClassKind::Htb(HtbClassParams::new(
                Bandwidth::megabits(2),
                Bandwidth::megabits(5),
            )),
        };
        adapter.apply_class(&class).await.unwrap();
        adapter.record_traffic(&dev(), h("1:10"), 3000, 20).await;

        let service = StatisticsService::new(read_models, adapter);
        let stats = service.device_statistics(&dev()).await.unwrap();

        assert_eq!(stats.classes.len(), 1);
        let class_stats = &stats.classes[0];
        assert_eq!(class_stats.name, "web");
        assert_eq!(class_stats.counters.as_ref().unwrap().bytes, 3000);
        assert_eq!(
            class_stats.detailed.as_ref().unwrap().htb.unwrap().rate_bps,
            2_000_000
        );
        assert_eq!(stats.link.tx_bytes, 3000);
    }

    #[tokio::test]
    async fn test_realtime_bypasses_read_model() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.record_traffic(&dev(), h("1:10"), 1000, 5).await;

        let service =
            StatisticsService::new(Arc::new(MemoryReadModelStore::new()), adapter);
        let stats = service.realtime_statistics(&dev()).await.unwrap();
        assert_eq!(stats.link.tx_bytes, 1000);
    }
}
