//! The wiring facade.
//!
//! [`TrafficController`] assembles the whole pipeline — stores, buses,
//! handlers, projections, statistics — over one kernel adapter, and is
//! the entry point applications use.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tcflow::kernel::MemoryAdapter;
//! use tcflow::policy::{TrafficClass, TrafficPolicy};
//! use tcflow::TrafficController;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tcflow::Result<()> {
//! let controller = TrafficController::new(Arc::new(MemoryAdapter::new()));
//!
//! let policy = TrafficPolicy::new("eth0")?
//!     .total_bandwidth("10mbit")?
//!     .class(
//!         TrafficClass::new("web")
//!             .guaranteed("2mbit")?
//!             .burstable_to("5mbit")?
//!             .priority(1)
//!             .https(),
//!     );
//! controller.apply_policy(&policy).await?;
//!
//! let topology = controller
//!     .query(tcflow::query::GetTopology {
//!         device: policy.device().clone(),
//!     })
//!     .await?;
//! assert_eq!(topology.classes.len(), 2); // web + default
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bus::{Command, CommandBus, EventBus, Query, QueryBus};
use crate::command::{
    ChangeClassBandwidth, ChangeClassPriority, CreateFilter, CreateFqCodelQdisc, CreateHtbClass,
    CreateHtbQdisc, CreatePrioQdisc, CreateTbfQdisc, DeleteClass, DeleteFilter, DeleteQdisc,
    TcCommandHandler,
};
use crate::domain::TrafficControlAggregate;
use crate::error::{Error, Result};
use crate::kernel::KernelAdapter;
use crate::policy::{PolicyCommand, TrafficPolicy};
use crate::projection::{ProjectionManager, StatsCollector, TopologyProjection};
use crate::query::{
    GetClass, GetClasses, GetDeviceStatistics, GetFilters, GetQdisc, GetRealtimeStatistics,
    GetTopology, ReplayQueryHandler, StatsQueryHandler, TopologyQueryHandler,
};
use crate::stats::sample::RawSample;
use crate::stats::{MonitorHandle, StatisticsService, StatsMonitor};
use crate::store::{
    EventStore, MemoryEventStore, MemoryReadModelStore, MemoryTimeSeriesStore, ReadModelStore,
    TimeSeriesStore,
};
use crate::types::DeviceName;

/// One wired command-query-event pipeline over a kernel adapter.
pub struct TrafficController {
    event_store: Arc<dyn EventStore>,
    read_models: Arc<dyn ReadModelStore>,
    timeseries: Arc<dyn TimeSeriesStore>,
    command_bus: CommandBus,
    query_bus: QueryBus,
    event_bus: Arc<EventBus>,
    projections: Arc<ProjectionManager>,
    statistics: Arc<StatisticsService>,
}

impl TrafficController {
    /// Wire a controller with in-memory stores.
    pub fn new(adapter: Arc<dyn KernelAdapter>) -> Self {
        Self::with_stores(
            adapter,
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemoryReadModelStore::new()),
            Arc::new(MemoryTimeSeriesStore::new()),
        )
    }

    /// Wire a controller over explicit store implementations.
    pub fn with_stores(
        adapter: Arc<dyn KernelAdapter>,
        event_store: Arc<dyn EventStore>,
        read_models: Arc<dyn ReadModelStore>,
        timeseries: Arc<dyn TimeSeriesStore>,
    ) -> Self {
        let mut projections = ProjectionManager::new();
        projections.register(Arc::new(TopologyProjection::new(read_models.clone())));
        projections.register(Arc::new(StatsCollector::new(timeseries.clone())));
        let projections = Arc::new(projections);

        let mut event_bus = EventBus::new();
        event_bus.subscribe(projections.clone());
        let event_bus = Arc::new(event_bus);

        let handler = Arc::new(TcCommandHandler::new(
            event_store.clone(),
            adapter.clone(),
            event_bus.clone(),
        ));
        let mut command_bus = CommandBus::new();
        command_bus.register_arc::<CreateHtbQdisc, _>(handler.clone());
        command_bus.register_arc::<CreateTbfQdisc, _>(handler.clone());
        command_bus.register_arc::<CreatePrioQdisc, _>(handler.clone());
        command_bus.register_arc::<CreateFqCodelQdisc, _>(handler.clone());
        command_bus.register_arc::<CreateHtbClass, _>(handler.clone());
        command_bus.register_arc::<ChangeClassBandwidth, _>(handler.clone());
        command_bus.register_arc::<ChangeClassPriority, _>(handler.clone());
        command_bus.register_arc::<DeleteClass, _>(handler.clone());
        command_bus.register_arc::<CreateFilter, _>(handler.clone());
        command_bus.register_arc::<DeleteFilter, _>(handler.clone());
        command_bus.register_arc::<DeleteQdisc, _>(handler);

        let statistics = Arc::new(StatisticsService::new(read_models.clone(), adapter));

        let mut query_bus = QueryBus::new();
        query_bus.register::<GetTopology, _>(TopologyQueryHandler::new(read_models.clone()));
        let replay = Arc::new(ReplayQueryHandler::new(event_store.clone()));
        query_bus.register_arc::<GetQdisc, _>(replay.clone());
        query_bus.register_arc::<GetClass, _>(replay.clone());
        query_bus.register_arc::<GetClasses, _>(replay.clone());
        query_bus.register_arc::<GetFilters, _>(replay);
        let stats_queries = Arc::new(StatsQueryHandler::new(statistics.clone()));
        query_bus.register_arc::<GetDeviceStatistics, _>(stats_queries.clone());
        query_bus.register_arc::<GetRealtimeStatistics, _>(stats_queries);

        info!(
            commands = command_bus.len(),
            projections = projections.len(),
            "traffic controller wired"
        );

        Self {
            event_store,
            read_models,
            timeseries,
            command_bus,
            query_bus,
            event_bus,
            projections,
            statistics,
        }
    }

    /// Dispatch one command.
    pub async fn execute<C: Command>(&self, command: C) -> Result<()> {
        self.command_bus.dispatch(command).await
    }

    /// Dispatch one query.
    pub async fn query<Q: Query>(&self, query: Q) -> Result<Q::Output> {
        self.query_bus.dispatch(query).await
    }

    /// Compile a policy and execute its command sequence in order.
    ///
    /// Refuses to finish while the HTB default class is unresolved.
    pub async fn apply_policy(&self, policy: &TrafficPolicy) -> Result<()> {
        let commands = policy.commands()?;
        for command in commands {
            match command {
                PolicyCommand::Qdisc(cmd) => self.execute(cmd).await?,
                PolicyCommand::Class(cmd) => self.execute(cmd).await?,
                PolicyCommand::Filter(cmd) => self.execute(cmd).await?,
            }
        }

        let records = self
            .event_store
            .events_for(&policy.device().aggregate_id())
            .await?;
        let aggregate = TrafficControlAggregate::from_events(policy.device().clone(), &records);
        if let Some(handle) = aggregate.unresolved_htb_default_class() {
            return Err(Error::domain(format!(
                "htb default class {handle} was never created"
            )));
        }
        Ok(())
    }

    /// Reset every projection and replay the whole event store.
    pub async fn rebuild_projections(&self) -> Result<()> {
        self.projections.rebuild(self.event_store.as_ref()).await
    }

    /// The statistics service.
    pub fn statistics(&self) -> Arc<StatisticsService> {
        self.statistics.clone()
    }

    /// Start periodic statistics collection for one device. Samples go
    /// to `callback` and to the time-series store via the event bus.
    pub fn monitor<F>(&self, device: DeviceName, period: Duration, callback: F) -> MonitorHandle
    where
        F: FnMut(&RawSample) + Send + 'static,
    {
        StatsMonitor::new(self.statistics.clone(), self.event_bus.clone())
            .spawn(device, period, callback)
    }

    /// The event store behind this controller.
    pub fn event_store(&self) -> Arc<dyn EventStore> {
        self.event_store.clone()
    }

    /// The read-model store behind this controller.
    pub fn read_models(&self) -> Arc<dyn ReadModelStore> {
        self.read_models.clone()
    }

    /// The time-series store behind this controller.
    pub fn timeseries(&self) -> Arc<dyn TimeSeriesStore> {
        self.timeseries.clone()
    }
}
