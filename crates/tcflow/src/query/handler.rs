//! Query handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::QueryHandler;
use crate::domain::TrafficControlAggregate;
use crate::error::{Error, Result};
use crate::projection::TOPOLOGY_COLLECTION;
use crate::query::views::{ClassView, FilterView, QdiscView, TopologyView};
use crate::query::{
    GetClass, GetClasses, GetDeviceStatistics, GetFilters, GetQdisc, GetRealtimeStatistics,
    GetTopology,
};
use crate::stats::{DeviceStatistics, RealtimeStatistics, StatisticsService};
use crate::store::{EventStore, ReadModelStore};
use crate::types::DeviceName;

/// Serves materialized views from the read-model store.
pub struct TopologyQueryHandler {
    read_models: Arc<dyn ReadModelStore>,
}

impl TopologyQueryHandler {
    /// Wire a handler over the read-model store.
    pub fn new(read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { read_models }
    }
}

#[async_trait]
impl QueryHandler<GetTopology> for TopologyQueryHandler {
    async fn handle(&self, query: GetTopology) -> Result<TopologyView> {
        let doc = self
            .read_models
            .get(TOPOLOGY_COLLECTION, &query.device.aggregate_id())
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    Error::NotFound(format!("no configured topology for {}", query.device))
                } else {
                    err
                }
            })?;
        Ok(serde_json::from_value(doc)?)
    }
}

/// Serves views by replaying the aggregate from its event stream.
pub struct ReplayQueryHandler {
    store: Arc<dyn EventStore>,
}

impl ReplayQueryHandler {
    /// Wire a handler over the event store.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    async fn load(&self, device: &DeviceName) -> Result<TrafficControlAggregate> {
        let records = self.store.events_for(&device.aggregate_id()).await?;
        Ok(TrafficControlAggregate::from_events(device.clone(), &records))
    }
}

#[async_trait]
impl QueryHandler<GetQdisc> for ReplayQueryHandler {
    async fn handle(&self, query: GetQdisc) -> Result<Option<QdiscView>> {
        let aggregate = self.load(&query.device).await?;
        Ok(aggregate.root_qdisc().map(Into::into))
    }
}

#[async_trait]
impl QueryHandler<GetClass> for ReplayQueryHandler {
    async fn handle(&self, query: GetClass) -> Result<Option<ClassView>> {
        let aggregate = self.load(&query.device).await?;
        Ok(aggregate.class(query.handle).map(Into::into))
    }
}

#[async_trait]
impl QueryHandler<GetClasses> for ReplayQueryHandler {
    async fn handle(&self, query: GetClasses) -> Result<Vec<ClassView>> {
        let aggregate = self.load(&query.device).await?;
        let mut classes: Vec<ClassView> = aggregate.classes().map(Into::into).collect();
        classes.sort_by_key(|c| c.handle);
        Ok(classes)
    }
}

#[async_trait]
impl QueryHandler<GetFilters> for ReplayQueryHandler {
    async fn handle(&self, query: GetFilters) -> Result<Vec<FilterView>> {
        let aggregate = self.load(&query.device).await?;
        let mut filters: Vec<FilterView> = aggregate.filters().map(Into::into).collect();
        filters.sort_by_key(|f| (f.parent, f.priority, f.handle));
        Ok(filters)
    }
}

/// Serves statistics through the statistics service.
pub struct StatsQueryHandler {
    service: Arc<StatisticsService>,
}

impl StatsQueryHandler {
    /// Wire a handler over the statistics service.
    pub fn new(service: Arc<StatisticsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl QueryHandler<GetDeviceStatistics> for StatsQueryHandler {
    async fn handle(&self, query: GetDeviceStatistics) -> Result<DeviceStatistics> {
        self.service.device_statistics(&query.device).await
    }
}

#[async_trait]
impl QueryHandler<GetRealtimeStatistics> for StatsQueryHandler {
    async fn handle(&self, query: GetRealtimeStatistics) -> Result<RealtimeStatistics> {
        self.service.realtime_statistics(&query.device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEventStore;
    use crate::types::{Bandwidth, Handle, Priority};
    use crate::event::TcEvent;
    use crate::domain::HtbClassParams;

    fn dev() -> DeviceName {
        DeviceName::new("eth0").unwrap()
    }

    fn h(s: &str) -> Handle {
        s.parse().unwrap()
    }

    async fn seeded_store() -> Arc<MemoryEventStore> {
        let store = Arc::new(MemoryEventStore::new());
        store
            .append(
                "tc:eth0",
                0,
                vec![
                    TcEvent::HtbQdiscCreated {
                        device: dev(),
                        handle: h("1:0"),
                        default_class: h("1:999"),
                        r2q: 10,
                        link_bandwidth: Some(Bandwidth::megabits(10)),
                    },
                    TcEvent::HtbClassCreated {
                        device: dev(),
                        parent: h("1:0"),
                        handle: h("1:10"),
                        name: "web".into(),
                        priority: Priority::new(1).unwrap(),
                        params: HtbClassParams::new(
                            Bandwidth::megabits(2),
                            Bandwidth::megabits(5),
                        ),
                    },
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_replay_queries() {
        let handler = ReplayQueryHandler::new(seeded_store().await);

        let qdisc = handler
            .handle(GetQdisc { device: dev() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(qdisc.kind, "htb");

        let classes = handler.handle(GetClasses { device: dev() }).await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "web");

        let class = handler
            .handle(GetClass {
                device: dev(),
                handle: h("1:10"),
            })
            .await
            .unwrap();
        assert!(class.is_some());
        let missing = handler
            .handle(GetClass {
                device: dev(),
                handle: h("1:11"),
            })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_topology_query_not_found() {
        use crate::store::MemoryReadModelStore;
        let handler = TopologyQueryHandler::new(Arc::new(MemoryReadModelStore::new()));
        let err = handler.handle(GetTopology { device: dev() }).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("eth0"));
    }
}
