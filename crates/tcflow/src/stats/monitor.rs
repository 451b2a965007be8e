//! Periodic statistics collection.
//!
//! The monitor samples one device on an interval, hands each sample to
//! a callback, and publishes it on the event bus so the time-series
//! collector projection stores it. It terminates when its handle is
//! stopped; the callback is never invoked after `stop` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::event::{EventRecord, TcEvent};
use crate::stats::sample::RawSample;
use crate::stats::service::StatisticsService;
use crate::types::DeviceName;

/// Periodic sampler for one device.
pub struct StatsMonitor {
    service: Arc<StatisticsService>,
    bus: Arc<EventBus>,
}

/// Running monitor; dropping it without [`MonitorHandle::stop`] aborts
/// the sampling task.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the sampling loop to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl StatsMonitor {
    /// Wire a monitor over the service and event bus.
    pub fn new(service: Arc<StatisticsService>, bus: Arc<EventBus>) -> Self {
        Self { service, bus }
    }

    /// Start sampling `device` every `period`.
    ///
    /// Each successful sample is passed to `callback` and published as a
    /// `StatisticsSampled` notification. Sampling errors are logged and
    /// the loop keeps going.
    pub fn spawn<F>(&self, device: DeviceName, period: Duration, mut callback: F) -> MonitorHandle
    where
        F: FnMut(&RawSample) + Send + 'static,
    {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let service = self.service.clone();
        let bus = self.bus.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!(device = device.as_str(), "stats monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match service.sample(&device).await {
                            Ok(sample) => {
                                callback(&sample);
                                let record = EventRecord::notification(TcEvent::StatisticsSampled {
                                    device: device.clone(),
                                    sample,
                                });
                                if let Err(err) = bus.publish(&record).await {
                                    warn!(device = device.as_str(), %err, "sample fan-out failed");
                                }
                            }
                            Err(err) => {
                                warn!(device = device.as_str(), %err, "statistics sample failed");
                            }
                        }
                    }
                }
            }
        });

        MonitorHandle {
            shutdown,
            task: Some(task),
        }
    }
}
