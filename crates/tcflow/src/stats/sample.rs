//! Raw and aggregated statistics samples.
//!
//! A [`RawSample`] is one point-in-time reading of everything the kernel
//! counts for a device: link totals, per-qdisc and per-class counters,
//! and per-filter match counts. Samples are immutable once stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Handle;

/// Interface-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCounters {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Packets received.
    pub rx_packets: u64,
    /// Packets transmitted.
    pub tx_packets: u64,
    /// Receive errors.
    pub rx_errors: u64,
    /// Transmit errors.
    pub tx_errors: u64,
    /// Receive drops.
    pub rx_dropped: u64,
    /// Transmit drops.
    pub tx_dropped: u64,
}

/// Counters for one qdisc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdiscCounters {
    /// Qdisc handle.
    pub handle: Handle,
    /// Scheduler name ("htb", "fq_codel", ...).
    pub kind: String,
    /// Bytes dequeued.
    pub bytes: u64,
    /// Packets dequeued.
    pub packets: u64,
    /// Packets dropped.
    pub drops: u64,
    /// Packets that hit the rate limit.
    pub overlimits: u64,
    /// Packets requeued.
    pub requeues: u64,
    /// Current queue length in packets.
    pub qlen: u32,
    /// Current backlog in bytes.
    pub backlog: u32,
}

/// Counters for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCounters {
    /// Class handle.
    pub handle: Handle,
    /// Bytes dequeued.
    pub bytes: u64,
    /// Packets dequeued.
    pub packets: u64,
    /// Packets dropped.
    pub drops: u64,
    /// Packets that hit the rate limit.
    pub overlimits: u64,
    /// Current queue length in packets.
    pub qlen: u32,
    /// Current backlog in bytes.
    pub backlog: u32,
}

/// Match count for one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMatchCounters {
    /// The classifying qdisc.
    pub parent: Handle,
    /// Filter priority.
    pub priority: u16,
    /// Filter handle.
    pub handle: Handle,
    /// Packets matched.
    pub matches: u64,
}

/// One point-in-time statistics reading for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// When the sample was taken.
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

impl RawSample {
    /// An empty sample at the given instant.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            link: LinkCounters::default(),
            qdiscs: Vec::new(),
            classes: Vec::new(),
            filters: Vec::new(),
        }
    }
}

/// Detailed per-object statistics beyond the basic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedStats {
    /// Current queue length in packets.
    pub qlen: u32,
    /// Current backlog in bytes.
    pub backlog: u32,
    /// Smoothed throughput in bytes per second.
    pub bytes_per_second: f64,
    /// Smoothed throughput in packets per second.
    pub packets_per_second: f64,
    /// HTB-specific detail, for HTB qdiscs and classes.
    pub htb: Option<HtbDetail>,
}

/// HTB scheduler internals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HtbDetail {
    /// Packets sent through the direct queue, bypassing classification.
    pub direct_packets: u32,
    /// HTB version reported by the kernel.
    pub version: u32,
    /// Tokens lent to children.
    pub lends: u64,
    /// Tokens borrowed from the parent.
    pub borrows: u64,
    /// Current token count.
    pub tokens: i64,
    /// Current ceil token count.
    pub ctokens: i64,
    /// Configured rate in bits per second.
    pub rate_bps: u64,
    /// Configured ceiling in bits per second.
    pub ceil_bps: u64,
    /// Level in the class tree, 0 for leaves.
    pub level: u32,
}

/// A rollup of raw samples over one interval.
///
/// Rollup computation itself runs elsewhere; the store only upserts by
/// `(device, interval, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSample {
    /// Start of the aggregated window.
    pub timestamp: DateTime<Utc>,
    /// Total bytes received over the window.
    pub rx_bytes: u64,
    /// Total bytes transmitted over the window.
    pub tx_bytes: u64,
    /// Peak receive rate in bits per second.
    pub peak_rx_bps: u64,
    /// Peak transmit rate in bits per second.
    pub peak_tx_bps: u64,
    /// Raw samples folded into this rollup.
    pub sample_count: u64,
}
