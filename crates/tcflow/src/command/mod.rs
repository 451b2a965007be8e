//! Commands: validated intents against one device's topology.
//!
//! A command names the device it targets and the change it wants; the
//! aggregate decides whether that change is legal. All commands here
//! dispatch to [`TcCommandHandler`](handler::TcCommandHandler).

pub mod handler;

use crate::bus::Command;
use crate::domain::filter::{FilterProtocol, Match};
use crate::domain::qdisc::FqCodelParams;
use crate::types::{Bandwidth, DeviceName, Handle, Priority};

pub use handler::TcCommandHandler;

/// Kernel default quantum divisor for HTB.
pub const DEFAULT_R2Q: u32 = 10;

/// Kernel default priomap for PRIO qdiscs.
pub const DEFAULT_PRIOMAP: [u8; 16] = [1, 2, 2, 2, 1, 2, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];

/// Create the root HTB qdisc on a device.
#[derive(Debug, Clone)]
pub struct CreateHtbQdisc {
    /// Target device.
    pub device: DeviceName,
    /// Qdisc handle, `major:0`.
    pub handle: Handle,
    /// Class for unclassified traffic.
    pub default_class: Handle,
    /// Quantum divisor; kernel default when `None`.
    pub r2q: Option<u32>,
    /// Declared physical link ceiling, used for rate budgeting.
    pub link_bandwidth: Option<Bandwidth>,
}

impl Command for CreateHtbQdisc {}

/// Create a TBF root qdisc.
#[derive(Debug, Clone)]
pub struct CreateTbfQdisc {
    /// Target device.
    pub device: DeviceName,
    /// Qdisc handle, `major:0`.
    pub handle: Handle,
    /// Shaping rate.
    pub rate: Bandwidth,
    /// Bucket size in bytes.
    pub burst: u32,
    /// Queue limit in bytes.
    pub limit: u32,
}

impl Command for CreateTbfQdisc {}

/// Create a PRIO root qdisc.
#[derive(Debug, Clone)]
pub struct CreatePrioQdisc {
    /// Target device.
    pub device: DeviceName,
    /// Qdisc handle, `major:0`.
    pub handle: Handle,
    /// Number of bands, 1..=16.
    pub bands: u8,
    /// Priority-to-band map, 16 entries.
    pub priomap: [u8; 16],
}

impl Command for CreatePrioQdisc {}

/// Create an fq_codel root qdisc.
#[derive(Debug, Clone)]
pub struct CreateFqCodelQdisc {
    /// Target device.
    pub device: DeviceName,
    /// Qdisc handle, `major:0`.
    pub handle: Handle,
    /// Scheduler parameters.
    pub params: FqCodelParams,
}

impl Command for CreateFqCodelQdisc {}

/// Create an HTB class.
#[derive(Debug, Clone)]
pub struct CreateHtbClass {
    /// Target device.
    pub device: DeviceName,
    /// Parent qdisc or class.
    pub parent: Handle,
    /// Class handle, minor > 0.
    pub handle: Handle,
    /// Human-readable name.
    pub name: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Guaranteed rate.
    pub rate: Bandwidth,
    /// Borrowing ceiling.
    pub ceil: Bandwidth,
    /// Burst buffer in bytes.
    pub burst: Option<u32>,
    /// Ceil burst buffer in bytes.
    pub cburst: Option<u32>,
    /// Bytes served per round.
    pub quantum: Option<u32>,
    /// Per-packet overhead in bytes.
    pub overhead: Option<u16>,
    /// Minimum packet unit in bytes.
    pub mpu: Option<u16>,
    /// MTU for rate table computation.
    pub mtu: Option<u32>,
}

impl CreateHtbClass {
    /// A class with just the required attributes; optional HTB knobs
    /// default kernel-side.
    pub fn new(
        device: DeviceName,
        parent: Handle,
        handle: Handle,
        name: impl Into<String>,
        priority: Priority,
        rate: Bandwidth,
        ceil: Bandwidth,
    ) -> Self {
        Self {
            device,
            parent,
            handle,
            name: name.into(),
            priority,
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

impl Command for CreateHtbClass {}

/// Change a class's guaranteed rate and ceiling.
#[derive(Debug, Clone)]
pub struct ChangeClassBandwidth {
    /// Target device.
    pub device: DeviceName,
    /// Class to modify.
    pub handle: Handle,
    /// New guaranteed rate.
    pub rate: Bandwidth,
    /// New ceiling.
    pub ceil: Bandwidth,
}

impl Command for ChangeClassBandwidth {}

/// Change a class's priority.
#[derive(Debug, Clone)]
pub struct ChangeClassPriority {
    /// Target device.
    pub device: DeviceName,
    /// Class to modify.
    pub handle: Handle,
    /// New priority.
    pub priority: Priority,
}

impl Command for ChangeClassPriority {}

/// Delete a class.
#[derive(Debug, Clone)]
pub struct DeleteClass {
    /// Target device.
    pub device: DeviceName,
    /// Class to remove.
    pub handle: Handle,
}

impl Command for DeleteClass {}

/// Create a filter steering traffic into a class.
#[derive(Debug, Clone)]
pub struct CreateFilter {
    /// Target device.
    pub device: DeviceName,
    /// The classifying qdisc.
    pub parent: Handle,
    /// Ordering among siblings.
    pub priority: u16,
    /// Protocol to classify.
    pub protocol: FilterProtocol,
    /// Target class.
    pub flow_id: Handle,
    /// Match predicates.
    pub matches: Vec<Match>,
}

impl Command for CreateFilter {}

/// Delete a filter by its full identity.
#[derive(Debug, Clone)]
pub struct DeleteFilter {
    /// Target device.
    pub device: DeviceName,
    /// The classifying qdisc.
    pub parent: Handle,
    /// Filter priority.
    pub priority: u16,
    /// Filter handle.
    pub handle: Handle,
}

impl Command for DeleteFilter {}

/// Delete a qdisc with nothing under it.
#[derive(Debug, Clone)]
pub struct DeleteQdisc {
    /// Target device.
    pub device: DeviceName,
    /// Qdisc to remove.
    pub handle: Handle,
}

impl Command for DeleteQdisc {}
