//! Qdisc entities.
//!
//! A qdisc is modeled as a tagged variant: shared attributes (device,
//! handle, parent) live in the [`Qdisc`] envelope, scheduler-specific
//! parameters in [`QdiscKind`]. Dispatch is on the variant.

use serde::{Deserialize, Serialize};

use crate::types::{Bandwidth, DeviceName, Handle};

/// Scheduler-specific qdisc parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QdiscKind {
    /// Hierarchical token bucket.
    Htb {
        /// Class that catches unclassified traffic. Must exist once
        /// class creation completes.
        default_class: Handle,
        /// Quantum divisor (quantum = rate / r2q when not set per class).
        r2q: u32,
    },
    /// Token bucket filter, a single-rate shaper.
    Tbf {
        /// Shaping rate.
        rate: Bandwidth,
        /// Bucket size in bytes.
        burst: u32,
        /// Queue limit in bytes.
        limit: u32,
    },
    /// Strict-priority multi-band scheduler.
    Prio {
        /// Number of bands, 1..=16.
        bands: u8,
        /// Mapping from packet priority to band; always 16 entries.
        priomap: [u8; 16],
    },
    /// Fair-queue controlled-delay scheduler.
    FqCodel(FqCodelParams),
}

impl QdiscKind {
    /// Kernel name for this scheduler.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Htb { .. } => "htb",
            Self::Tbf { .. } => "tbf",
            Self::Prio { .. } => "prio",
            Self::FqCodel(_) => "fq_codel",
        }
    }
}

/// fq_codel parameters, defaulting to the kernel's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FqCodelParams {
    /// Queue limit in packets.
    pub limit: u32,
    /// CoDel target delay in microseconds.
    pub target_us: u32,
    /// CoDel interval in microseconds.
    pub interval_us: u32,
    /// Number of flow queues.
    pub flows: u32,
    /// Bytes dequeued per round.
    pub quantum: u32,
    /// Mark packets with ECN instead of dropping.
    pub ecn: bool,
}

impl Default for FqCodelParams {
    fn default() -> Self {
        Self {
            limit: 10_240,
            target_us: 5_000,
            interval_us: 100_000,
            flows: 1_024,
            quantum: 1_514,
            ecn: true,
        }
    }
}

/// A queueing discipline attached to an interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qdisc {
    /// Interface the qdisc is attached to.
    pub device: DeviceName,
    /// Handle, `major:0`.
    pub handle: Handle,
    /// Parent handle; `None` for the root qdisc.
    pub parent: Option<Handle>,
    /// Scheduler-specific parameters.
    pub kind: QdiscKind,
    /// Declared physical link ceiling, when known. HTB rate checks use it
    /// as the budget for root-level classes.
    pub link_bandwidth: Option<Bandwidth>,
}

impl Qdisc {
    /// Kernel name of the scheduler ("htb", "tbf", ...).
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// The HTB default class, when this is an HTB qdisc.
    pub fn htb_default_class(&self) -> Option<Handle> {
        match self.kind {
            QdiscKind::Htb { default_class, .. } => Some(default_class),
            _ => None,
        }
    }
}
