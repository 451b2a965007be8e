//! The kernel-control boundary.
//!
//! Command handlers and the statistics service never talk netlink
//! directly; they go through [`KernelAdapter`]. Every call returns
//! either success with a payload or a typed error, never both. The
//! netlink-backed implementation lives outside this crate; the
//! [`MemoryAdapter`] here is the reference used by tests, simulations,
//! and the CLI's dry-run mode.

pub mod memory;

use async_trait::async_trait;

use crate::domain::{Class, Filter, Qdisc};
use crate::error::Result;
use crate::stats::sample::{
    ClassCounters, DetailedStats, FilterMatchCounters, LinkCounters, QdiscCounters,
};
use crate::types::{DeviceName, Handle};

pub use memory::MemoryAdapter;

/// Capability set of the kernel transport.
///
/// Calls may block on kernel I/O; callers apply their own timeouts by
/// racing the future against a timer.
#[async_trait]
pub trait KernelAdapter: Send + Sync {
    /// Install a qdisc.
    async fn apply_qdisc(&self, qdisc: &Qdisc) -> Result<()>;

    /// Remove a qdisc.
    async fn delete_qdisc(&self, device: &DeviceName, handle: Handle) -> Result<()>;

    /// Install or replace a class.
    async fn apply_class(&self, class: &Class) -> Result<()>;

    /// Remove a class.
    async fn delete_class(&self, device: &DeviceName, handle: Handle) -> Result<()>;

    /// Install a filter.
    async fn apply_filter(&self, filter: &Filter) -> Result<()>;

    /// Remove a filter.
    async fn delete_filter(
        &self,
        device: &DeviceName,
        parent: Handle,
        priority: u16,
        handle: Handle,
    ) -> Result<()>;

    /// Per-qdisc counters for a device.
    async fn qdiscs(&self, device: &DeviceName) -> Result<Vec<QdiscCounters>>;

    /// Per-class counters for a device.
    async fn classes(&self, device: &DeviceName) -> Result<Vec<ClassCounters>>;

    /// Per-filter match counts for a device.
    async fn filters(&self, device: &DeviceName) -> Result<Vec<FilterMatchCounters>>;

    /// Detailed statistics for one qdisc.
    async fn detailed_qdisc_stats(
        &self,
        device: &DeviceName,
        handle: Handle,
    ) -> Result<DetailedStats>;

    /// Detailed statistics for one class.
    async fn detailed_class_stats(
        &self,
        device: &DeviceName,
        handle: Handle,
    ) -> Result<DetailedStats>;

    /// Interface totals.
    async fn link_stats(&self, device: &DeviceName) -> Result<LinkCounters>;
}
