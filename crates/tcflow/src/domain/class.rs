//! Traffic class entities.

use serde::{Deserialize, Serialize};

use crate::types::{Bandwidth, DeviceName, Handle, Priority};

/// HTB class parameters.
///
/// `rate` is the guaranteed share, `ceil` the borrowing ceiling. The
/// optional fields default kernel-side when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtbClassParams {
    /// Guaranteed rate.
    pub rate: Bandwidth,
    /// Maximum rate when borrowing from the parent.
    pub ceil: Bandwidth,
    /// Burst buffer in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    /// Ceil burst buffer in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cburst: Option<u32>,
    /// Bytes served per round before moving to the next class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum: Option<u32>,
    /// Per-packet overhead in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overhead: Option<u16>,
    /// Minimum packet unit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpu: Option<u16>,
    /// MTU used for rate table computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

impl HtbClassParams {
    /// Minimal parameters: rate and ceil, everything else kernel-defaulted.
    pub fn new(rate: Bandwidth, ceil: Bandwidth) -> Self {
        Self {
            rate,
            ceil,
            burst: None,
            cburst: None,
            quantum: None,
            overhead: None,
            mpu: None,
            mtu: None,
        }
    }
}

/// Scheduler-specific class parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassKind {
    /// HTB class with guaranteed rate and ceiling.
    Htb(HtbClassParams),
}

/// A bandwidth class within a classful qdisc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    /// Interface the class lives on.
    pub device: DeviceName,
    /// Class handle, `major:minor` with `minor > 0`.
    pub handle: Handle,
    /// Parent qdisc or class.
    pub parent: Handle,
    /// Human-readable name ("web", "ssh", ...).
    pub name: String,
    /// Scheduling priority, 0 highest.
    pub priority: Priority,
    /// Scheduler-specific parameters.
    pub kind: ClassKind,
}

impl Class {
    /// Guaranteed rate of this class.
    pub fn rate(&self) -> Bandwidth {
        match &self.kind {
            ClassKind::Htb(p) => p.rate,
        }
    }

    /// Borrowing ceiling of this class.
    pub fn ceil(&self) -> Bandwidth {
        match &self.kind {
            ClassKind::Htb(p) => p.ceil,
        }
    }
}
