//! Projections: event consumers that maintain read models.
//!
//! The manager subscribes to the event bus and forwards every event to
//! every projection in registration order. One projection failing never
//! stops the others; failures are collected into a composite error.
//! Rebuilding resets each projection and streams the whole event store
//! through it again, which must yield byte-identical read models.

pub mod stats_collector;
pub mod topology;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::bus::EventSubscriber;
use crate::error::{Error, FanoutErrors, Result};
use crate::event::EventRecord;
use crate::store::EventStore;

pub use stats_collector::StatsCollector;
pub use topology::{TOPOLOGY_COLLECTION, TopologyProjection};

/// A read-model maintainer.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Stable name, used in error reports and logs.
    fn name(&self) -> &str;

    /// Fold one event into the read model.
    async fn handle(&self, record: &EventRecord) -> Result<()>;

    /// Drop all derived state, ready for a replay from scratch.
    async fn reset(&self) -> Result<()>;
}

/// Ordered fan-out over registered projections.
#[derive(Default)]
pub struct ProjectionManager {
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a projection. Order is preserved.
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Forward one event to every projection, collecting failures.
    pub async fn process(&self, record: &EventRecord) -> Result<()> {
        let mut failures = Vec::new();
        for projection in &self.projections {
            if let Err(err) = projection.handle(record).await {
                failures.push((projection.name().to_string(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Fanout(FanoutErrors(failures)))
        }
    }

    /// Reset every projection, then stream all stored events through
    /// them in stored order.
    pub async fn rebuild(&self, store: &dyn EventStore) -> Result<()> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        let records = store.all_events().await?;
        info!(events = records.len(), "rebuilding projections");
        for record in &records {
            self.process(record).await?;
        }
        Ok(())
    }

    /// Number of registered projections.
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

#[async_trait]
impl EventSubscriber for ProjectionManager {
    fn name(&self) -> &str {
        "projections"
    }

    async fn on_event(&self, record: &EventRecord) -> Result<()> {
        self.process(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::event::TcEvent;
    use crate::types::{DeviceName, Handle};

    struct Flaky {
        name: &'static str,
        handled: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Projection for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _record: &EventRecord) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::validation("broken projection"))
            } else {
                Ok(())
            }
        }

        async fn reset(&self) -> Result<()> {
            self.handled.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record() -> EventRecord {
        EventRecord::notification(TcEvent::ClassDeleted {
            device: DeviceName::new("eth0").unwrap(),
            handle: Handle::new(1, 10).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_siblings() {
        let bad = Arc::new(Flaky {
            name: "bad",
            handled: AtomicUsize::new(0),
            fail: true,
        });
        let good = Arc::new(Flaky {
            name: "good",
            handled: AtomicUsize::new(0),
            fail: false,
        });
        let mut manager = ProjectionManager::new();
        manager.register(bad.clone());
        manager.register(good.clone());

        let err = manager.process(&record()).await.unwrap_err();
        assert_eq!(good.handled.load(Ordering::SeqCst), 1);
        match err {
            Error::Fanout(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures.0[0].0, "bad");
            }
            other => panic!("expected fan-out error, got {other}"),
        }
    }
}
