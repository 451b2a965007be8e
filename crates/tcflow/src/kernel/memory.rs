//! In-memory kernel adapter.
//!
//! Keeps the applied topology per device and serves deterministic
//! counters from injected traffic, so handler and statistics paths can
//! be exercised end to end without a netlink socket. A one-shot failure
//! switch simulates kernel refusals.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Class, Filter, Qdisc, QdiscKind};
use crate::error::{Error, Result};
use crate::kernel::KernelAdapter;
use crate::stats::sample::{
    ClassCounters, DetailedStats, FilterMatchCounters, HtbDetail, LinkCounters, QdiscCounters,
};
use crate::types::{DeviceName, Handle};

#[derive(Debug, Default)]
struct Traffic {
    bytes: u64,
    packets: u64,
}

#[derive(Debug, Default)]
struct DeviceState {
    qdiscs: HashMap<Handle, Qdisc>,
    classes: HashMap<Handle, Class>,
    filters: HashMap<(Handle, u16, Handle), Filter>,
    link: LinkCounters,
    traffic: HashMap<Handle, Traffic>,
    filter_hits: HashMap<(Handle, u16, Handle), u64>,
}

/// Reference adapter holding kernel state in memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    devices: RwLock<HashMap<String, DeviceState>>,
    fail_next: RwLock<Option<String>>,
}

impl MemoryAdapter {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next apply/delete call fail with `reason`, once.
    pub async fn fail_next_apply(&self, reason: impl Into<String>) {
        *self.fail_next.write().await = Some(reason.into());
    }

    /// Inject transmitted traffic for a class. Bumps the class, every
    /// filter steering into it, and the device's link totals, so joined
    /// statistics have something to show.
    pub async fn record_traffic(&self, device: &DeviceName, class: Handle, bytes: u64, packets: u64) {
        let mut devices = self.devices.write().await;
        let state = devices.entry(device.as_str().to_string()).or_default();
        let traffic = state.traffic.entry(class).or_default();
        traffic.bytes += bytes;
        traffic.packets += packets;
        state.link.tx_bytes += bytes;
        state.link.tx_packets += packets;
        let DeviceState {
            filters,
            filter_hits,
            ..
        } = state;
        for (key, filter) in filters.iter() {
            if filter.flow_id == class {
                *filter_hits.entry(*key).or_default() += packets;
            }
        }
    }

    /// True when the device currently has this qdisc applied.
    pub async fn has_qdisc(&self, device: &DeviceName, handle: Handle) -> bool {
        let devices = self.devices.read().await;
        devices
            .get(device.as_str())
            .is_some_and(|s| s.qdiscs.contains_key(&handle))
    }

    /// Number of classes currently applied on the device.
    pub async fn class_count(&self, device: &DeviceName) -> usize {
        let devices = self.devices.read().await;
        devices.get(device.as_str()).map_or(0, |s| s.classes.len())
    }

    async fn take_failure(&self, operation: &str) -> Result<()> {
        if let Some(reason) = self.fail_next.write().await.take() {
            return Err(Error::kernel_apply(operation, reason));
        }
        Ok(())
    }

    fn traffic_of(state: &DeviceState, handle: Handle) -> (u64, u64) {
        state
            .traffic
            .get(&handle)
            .map_or((0, 0), |t| (t.bytes, t.packets))
    }
}

#[async_trait]
impl KernelAdapter for MemoryAdapter {
    async fn apply_qdisc(&self, qdisc: &Qdisc) -> Result<()> {
        self.take_failure(&format!("qdisc add {} on {}", qdisc.handle, qdisc.device))
            .await?;
        let mut devices = self.devices.write().await;
        devices
            .entry(qdisc.device.as_str().to_string())
            .or_default()
            .qdiscs
            .insert(qdisc.handle, qdisc.clone());
        Ok(())
    }

    async fn delete_qdisc(&self, device: &DeviceName, handle: Handle) -> Result<()> {
        self.take_failure(&format!("qdisc del {handle} on {device}"))
            .await?;
        let mut devices = self.devices.write().await;
        let state = devices
            .get_mut(device.as_str())
            .ok_or_else(|| Error::NotFound(format!("device {device}")))?;
        state
            .qdiscs
            .remove(&handle)
            .ok_or_else(|| Error::NotFound(format!("qdisc {handle} on {device}")))?;
        Ok(())
    }

    async fn apply_class(&self, class: &Class) -> Result<()> {
        self.take_failure(&format!("class add {} on {}", class.handle, class.device))
            .await?;
        let mut devices = self.devices.write().await;
        devices
            .entry(class.device.as_str().to_string())
            .or_default()
            .classes
            .insert(class.handle, class.clone());
        Ok(())
    }

    async fn delete_class(&self, device: &DeviceName, handle: Handle) -> Result<()> {
        self.take_failure(&format!("class del {handle} on {device}"))
            .await?;
        let mut devices = self.devices.write().await;
        let state = devices
            .get_mut(device.as_str())
            .ok_or_else(|| Error::NotFound(format!("device {device}")))?;
        state
            .classes
            .remove(&handle)
            .ok_or_else(|| Error::NotFound(format!("class {handle} on {device}")))?;
        Ok(())
    }

    async fn apply_filter(&self, filter: &Filter) -> Result<()> {
        self.take_failure(&format!("filter add {} on {}", filter.handle, filter.device))
            .await?;
        let mut devices = self.devices.write().await;
        devices
            .entry(filter.device.as_str().to_string())
            .or_default()
            .filters
            .insert((filter.parent, filter.priority, filter.handle), filter.clone());
        Ok(())
    }

    async fn delete_filter(
        &self,
        device: &DeviceName,
        parent: Handle,
        priority: u16,
        handle: Handle,
    ) -> Result<()> {
        self.take_failure(&format!("filter del {handle} on {device}"))
            .await?;
        let mut devices = self.devices.write().await;
        let state = devices
            .get_mut(device.as_str())
            .ok_or_else(|| Error::NotFound(format!("device {device}")))?;
        state
            .filters
            .remove(&(parent, priority, handle))
            .ok_or_else(|| Error::NotFound(format!("filter {handle} on {device}")))?;
        Ok(())
    }

    async fn qdiscs(&self, device: &DeviceName) -> Result<Vec<QdiscCounters>> {
        let devices = self.devices.read().await;
        let Some(state) = devices.get(device.as_str()) else {
            return Ok(Vec::new());
        };
        let mut counters: Vec<_> = state
            .qdiscs
            .values()
            .map(|q| {
                // A root qdisc accounts for everything its classes moved.
                let (bytes, packets) = state
                    .classes
                    .keys()
                    .map(|h| Self::traffic_of(state, *h))
                    .fold((0, 0), |acc, t| (acc.0 + t.0, acc.1 + t.1));
                QdiscCounters {
                    handle: q.handle,
                    kind: q.kind_name().to_string(),
                    bytes,
                    packets,
                    drops: 0,
                    overlimits: 0,
                    requeues: 0,
                    qlen: 0,
                    backlog: 0,
                }
            })
            .collect();
        counters.sort_by_key(|c| c.handle);
        Ok(counters)
    }

    async fn classes(&self, device: &DeviceName) -> Result<Vec<ClassCounters>> {
        let devices = self.devices.read().await;
        let Some(state) = devices.get(device.as_str()) else {
            return Ok(Vec::new());
        };
        let mut counters: Vec<_> = state
            .classes
            .values()
            .map(|c| {
                let (bytes, packets) = Self::traffic_of(state, c.handle);
                ClassCounters {
                    handle: c.handle,
                    bytes,
                    packets,
                    drops: 0,
                    overlimits: 0,
                    qlen: 0,
                    backlog: 0,
                }
            })
            .collect();
        counters.sort_by_key(|c| c.handle);
        Ok(counters)
    }

    async fn filters(&self, device: &DeviceName) -> Result<Vec<FilterMatchCounters>> {
        let devices = self.devices.read().await;
        let Some(state) = devices.get(device.as_str()) else {
            return Ok(Vec::new());
        };
        let mut counters: Vec<_> = state
            .filters
            .values()
            .map(|f| FilterMatchCounters {
                parent: f.parent,
                priority: f.priority,
                handle: f.handle,
                matches: state
                    .filter_hits
                    .get(&(f.parent, f.priority, f.handle))
                    .copied()
                    .unwrap_or(0),
            })
            .collect();
        counters.sort_by_key(|c| (c.parent, c.priority, c.handle));
        Ok(counters)
    }

    async fn detailed_qdisc_stats(
        &self,
        device: &DeviceName,
        handle: Handle,
    ) -> Result<DetailedStats> {
        let devices = self.devices.read().await;
        let state = devices
            .get(device.as_str())
            .ok_or_else(|| Error::NotFound(format!("device {device}")))?;
        let qdisc = state
            .qdiscs
            .get(&handle)
            .ok_or_else(|| Error::NotFound(format!("qdisc {handle} on {device}")))?;
        let htb = matches!(qdisc.kind, QdiscKind::Htb { .. }).then(|| HtbDetail {
            version: 0x30011,
            rate_bps: qdisc
                .link_bandwidth
                .map_or(0, |b| b.bits_per_second()),
            ceil_bps: qdisc
                .link_bandwidth
                .map_or(0, |b| b.bits_per_second()),
            ..Default::default()
        });
        Ok(DetailedStats {
            htb,
            ..Default::default()
        })
    }

    async fn detailed_class_stats(
        &self,
        device: &DeviceName,
        handle: Handle,
    ) -> Result<DetailedStats> {
        let devices = self.devices.read().await;
        let state = devices
            .get(device.as_str())
            .ok_or_else(|| Error::NotFound(format!("device {device}")))?;
        let class = state
            .classes
            .get(&handle)
            .ok_or_else(|| Error::NotFound(format!("class {handle} on {device}")))?;
        let (bytes, packets) = Self::traffic_of(state, handle);
        Ok(DetailedStats {
            qlen: 0,
            backlog: 0,
            bytes_per_second: bytes as f64,
            packets_per_second: packets as f64,
            htb: Some(HtbDetail {
                version: 0x30011,
                rate_bps: class.rate().bits_per_second(),
                ceil_bps: class.ceil().bits_per_second(),
                ..Default::default()
            }),
        })
    }

    async fn link_stats(&self, device: &DeviceName) -> Result<LinkCounters> {
        let devices = self.devices.read().await;
        Ok(devices
            .get(device.as_str())
            .map(|s| s.link)
            .unwrap_or_default())
    }
}
