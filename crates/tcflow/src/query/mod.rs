//! Queries: the read side.
//!
//! A query names the device it reads and resolves to a typed view,
//! either fetched from the read-model store, reconstructed by replaying
//! the aggregate, or joined from live kernel counters.

pub mod handler;
pub mod views;

use crate::bus::Query;
use crate::stats::{DeviceStatistics, RealtimeStatistics};
use crate::types::{DeviceName, Handle};

pub use handler::{ReplayQueryHandler, StatsQueryHandler, TopologyQueryHandler};
pub use views::{ClassView, FilterView, QdiscView, TopologyView};

/// The materialized topology of a device, from the read-model store.
#[derive(Debug, Clone)]
pub struct GetTopology {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetTopology {
    type Output = TopologyView;
}

/// The root qdisc of a device, reconstructed from the event stream.
#[derive(Debug, Clone)]
pub struct GetQdisc {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetQdisc {
    type Output = Option<QdiscView>;
}

/// One class of a device, reconstructed from the event stream.
#[derive(Debug, Clone)]
pub struct GetClass {
    /// Device to read.
    pub device: DeviceName,
    /// Class handle.
    pub handle: Handle,
}

impl Query for GetClass {
    type Output = Option<ClassView>;
}

/// All classes of a device, ordered by handle.
#[derive(Debug, Clone)]
pub struct GetClasses {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetClasses {
    type Output = Vec<ClassView>;
}

/// All filters of a device, ordered by (parent, priority, handle).
#[derive(Debug, Clone)]
pub struct GetFilters {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetFilters {
    type Output = Vec<FilterView>;
}

/// Configured topology joined with live kernel counters.
#[derive(Debug, Clone)]
pub struct GetDeviceStatistics {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetDeviceStatistics {
    type Output = DeviceStatistics;
}

/// Exactly what the kernel reports right now.
#[derive(Debug, Clone)]
pub struct GetRealtimeStatistics {
    /// Device to read.
    pub device: DeviceName,
}

impl Query for GetRealtimeStatistics {
    type Output = RealtimeStatistics;
}
