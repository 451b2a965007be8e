//! Time-series storage for statistics samples.
//!
//! Raw samples are immutable and kept per device in ascending timestamp
//! order; aggregated rollups upsert by `(device, interval, timestamp)`.
//! Device isolation is strict: a query for one device never returns
//! another device's data.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::stats::sample::{AggregatedSample, RawSample};
use crate::types::DeviceName;

/// Rollup interval for aggregated samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Hourly rollups.
    Hour,
    /// Daily rollups.
    Day,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hour => "hour",
            Self::Day => "day",
        })
    }
}

/// Oldest/newest timestamps and count for one device's raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRange {
    /// Timestamp of the oldest stored sample.
    pub oldest: DateTime<Utc>,
    /// Timestamp of the newest stored sample.
    pub newest: DateTime<Utc>,
    /// Number of stored samples.
    pub count: usize,
}

/// Diagnostic totals across all devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Devices with at least one sample.
    pub devices: usize,
    /// Raw samples across all devices.
    pub raw_samples: usize,
    /// Aggregated samples across all devices and intervals.
    pub aggregated_samples: usize,
}

/// Per-device statistics history.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Append a raw sample, keeping the device's list sorted by
    /// timestamp ascending.
    async fn store(&self, device: &DeviceName, sample: RawSample) -> Result<()>;

    /// Raw samples with timestamps in `[start, end]` (inclusive on both
    /// ends), ascending.
    async fn query(
        &self,
        device: &DeviceName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSample>>;

    /// Upsert an aggregated sample by timestamp within
    /// `(device, interval)`: append if the timestamp is new, replace the
    /// existing record otherwise (latest write wins).
    async fn store_aggregated(
        &self,
        device: &DeviceName,
        interval: Interval,
        sample: AggregatedSample,
    ) -> Result<()>;

    /// Aggregated samples in `[start, end]`, ascending.
    async fn query_aggregated(
        &self,
        device: &DeviceName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<AggregatedSample>>;

    /// Drop raw samples strictly before `before`; samples with
    /// `timestamp >= before` stay. Returns how many were removed.
    async fn delete(&self, device: &DeviceName, before: DateTime<Utc>) -> Result<usize>;

    /// `(oldest, newest, count)` for the device, or `None` when it has
    /// no samples.
    async fn data_range(&self, device: &DeviceName) -> Result<Option<DataRange>>;

    /// Diagnostic totals.
    async fn storage_stats(&self) -> Result<StorageStats>;
}

#[derive(Debug, Default)]
struct DeviceSeries {
    raw: Vec<RawSample>,
    aggregated: HashMap<Interval, Vec<AggregatedSample>>,
}

/// In-memory reference time-series store.
#[derive(Debug, Default)]
pub struct MemoryTimeSeriesStore {
    devices: RwLock<HashMap<String, DeviceSeries>>,
}

impl MemoryTimeSeriesStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    async fn store(&self, device: &DeviceName, sample: RawSample) -> Result<()> {
        let mut devices = self.devices.write().await;
        let series = devices.entry(device.as_str().to_string()).or_default();
        // Insert position keeps the list sorted; equal timestamps keep
        // arrival order.
        let at = series
            .raw
            .partition_point(|s| s.timestamp <= sample.timestamp);
        series.raw.insert(at, sample);
        Ok(())
    }

    async fn query(
        &self,
        device: &DeviceName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSample>> {
        let devices = self.devices.read().await;
        Ok(devices
            .get(device.as_str())
            .map(|series| {
                series
                    .raw
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn store_aggregated(
        &self,
        device: &DeviceName,
        interval: Interval,
        sample: AggregatedSample,
    ) -> Result<()> {
        let mut devices = self.devices.write().await;
        let series = devices.entry(device.as_str().to_string()).or_default();
        let rollups = series.aggregated.entry(interval).or_default();
        match rollups.iter_mut().find(|s| s.timestamp == sample.timestamp) {
            Some(existing) => *existing = sample,
            None => {
                let at = rollups.partition_point(|s| s.timestamp <= sample.timestamp);
                rollups.insert(at, sample);
            }
        }
        Ok(())
    }

    async fn query_aggregated(
        &self,
        device: &DeviceName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<AggregatedSample>> {
        let devices = self.devices.read().await;
        Ok(devices
            .get(device.as_str())
            .and_then(|series| series.aggregated.get(&interval))
            .map(|rollups| {
                rollups
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, device: &DeviceName, before: DateTime<Utc>) -> Result<usize> {
        let mut devices = self.devices.write().await;
        let Some(series) = devices.get_mut(device.as_str()) else {
            return Ok(0);
        };
        let len_before = series.raw.len();
        series.raw.retain(|s| s.timestamp >= before);
        Ok(len_before - series.raw.len())
    }

    async fn data_range(&self, device: &DeviceName) -> Result<Option<DataRange>> {
        let devices = self.devices.read().await;
        Ok(devices.get(device.as_str()).and_then(|series| {
            let oldest = series.raw.first()?.timestamp;
            let newest = series.raw.last()?.timestamp;
            Some(DataRange {
                oldest,
                newest,
                count: series.raw.len(),
            })
        }))
    }

    async fn storage_stats(&self) -> Result<StorageStats> {
        let devices = self.devices.read().await;
        let mut stats = StorageStats::default();
        for series in devices.values() {
            if series.raw.is_empty() && series.aggregated.values().all(Vec::is_empty) {
                continue;
            }
            stats.devices += 1;
            stats.raw_samples += series.raw.len();
            stats.aggregated_samples += series.aggregated.values().map(Vec::len).sum::<usize>();
        }
        Ok(stats)
    }
}
