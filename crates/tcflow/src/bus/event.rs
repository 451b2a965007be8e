//! Event fan-out.
//!
//! Every subscriber sees every published event. A failing subscriber
//! never cancels its siblings; failures are collected and returned as
//! one composite error after the fan-out completes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, FanoutErrors, Result};
use crate::event::EventRecord;

/// Receives every event published on the bus.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Stable name, used in fan-out error reports.
    fn name(&self) -> &str;

    /// Process one event.
    async fn on_event(&self, record: &EventRecord) -> Result<()>;
}

/// Fan-out bus. Subscribers are registered before traffic starts.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Publish one event to every subscriber.
    pub async fn publish(&self, record: &EventRecord) -> Result<()> {
        let mut failures = Vec::new();
        for subscriber in &self.subscribers {
            if let Err(err) = subscriber.on_event(record).await {
                warn!(
                    subscriber = subscriber.name(),
                    kind = record.kind(),
                    %err,
                    "event subscriber failed"
                );
                failures.push((subscriber.name().to_string(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Fanout(FanoutErrors(failures)))
        }
    }

    /// Publish a batch in order, collecting failures across the whole
    /// batch.
    pub async fn publish_all(&self, records: &[EventRecord]) -> Result<()> {
        let mut failures = Vec::new();
        for record in records {
            if let Err(Error::Fanout(FanoutErrors(batch))) = self.publish(record).await {
                failures.extend(batch);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Fanout(FanoutErrors(failures)))
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::event::TcEvent;
    use crate::types::{DeviceName, Handle};

    struct Tally {
        name: &'static str,
        seen: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventSubscriber for Tally {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_event(&self, _record: &EventRecord) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::validation("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn record() -> EventRecord {
        EventRecord::notification(TcEvent::ClassDeleted {
            device: DeviceName::new("eth0").unwrap(),
            handle: Handle::new(1, 10).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let ok = Arc::new(Tally {
            name: "ok",
            seen: AtomicUsize::new(0),
            fail: false,
        });
        let bad = Arc::new(Tally {
            name: "bad",
            seen: AtomicUsize::new(0),
            fail: true,
        });
        let late = Arc::new(Tally {
            name: "late",
            seen: AtomicUsize::new(0),
            fail: false,
        });

        let mut bus = EventBus::new();
        bus.subscribe(ok.clone());
        bus.subscribe(bad.clone());
        bus.subscribe(late.clone());

        let err = bus.publish(&record()).await.unwrap_err();
        // Everyone ran, including the subscriber after the failing one.
        assert_eq!(ok.seen.load(Ordering::SeqCst), 1);
        assert_eq!(bad.seen.load(Ordering::SeqCst), 1);
        assert_eq!(late.seen.load(Ordering::SeqCst), 1);

        match err {
            Error::Fanout(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures.0[0].0, "bad");
            }
            other => panic!("expected fan-out error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_publish_all_collects_across_batch() {
        let bad = Arc::new(Tally {
            name: "bad",
            seen: AtomicUsize::new(0),
            fail: true,
        });
        let mut bus = EventBus::new();
        bus.subscribe(bad.clone());

        let records = [record(), record()];
        let err = bus.publish_all(&records).await.unwrap_err();
        match err {
            Error::Fanout(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected fan-out error, got {other}"),
        }
        assert_eq!(bad.seen.load(Ordering::SeqCst), 2);
    }
}
