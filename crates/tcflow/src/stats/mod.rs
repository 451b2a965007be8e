//! Statistics: sample types, the joining service, and the periodic
//! monitor.

pub mod monitor;
pub mod sample;
pub mod service;

pub use monitor::{MonitorHandle, StatsMonitor};
pub use sample::{
    AggregatedSample, ClassCounters, DetailedStats, FilterMatchCounters, HtbDetail, LinkCounters,
    QdiscCounters, RawSample,
};
pub use service::{
    ClassStatistics, DeviceStatistics, FilterStatistics, QdiscStatistics, RealtimeStatistics,
    StatisticsService,
};
