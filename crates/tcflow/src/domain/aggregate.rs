//! The traffic-control aggregate.
//!
//! One aggregate owns the whole qdisc/class/filter topology of one
//! interface and is the only place structural invariants are enforced.
//! Commands go through a `decide` method that returns events or a domain
//! error; state changes only through [`TrafficControlAggregate::apply`],
//! which trusts events (replay never validates).

use std::collections::{HashMap, HashSet};

use crate::domain::class::{Class, ClassKind, HtbClassParams};
use crate::domain::filter::{Filter, FilterProtocol, Match};
use crate::domain::qdisc::{FqCodelParams, Qdisc, QdiscKind};
use crate::error::{Error, Result};
use crate::event::{EventRecord, TcEvent};
use crate::types::{Bandwidth, DeviceName, Handle, Priority};

/// Major number used for auto-assigned filter handles, matching the
/// kernel's default u32 hash table.
const FILTER_HANDLE_MAJOR: u16 = 0x800;

/// Identity of a filter within its aggregate.
type FilterKey = (Handle, u16, Handle);

/// Event-sourced topology of one interface.
#[derive(Debug, Clone, Default)]
pub struct TrafficControlAggregate {
    device: Option<DeviceName>,
    version: u64,
    qdiscs: HashMap<Handle, Qdisc>,
    classes: HashMap<Handle, Class>,
    filters: HashMap<FilterKey, Filter>,
}

impl TrafficControlAggregate {
    /// An empty aggregate for a device, version 0.
    pub fn new(device: DeviceName) -> Self {
        Self {
            device: Some(device),
            ..Self::default()
        }
    }

    /// Rebuild an aggregate by replaying its event stream in order.
    ///
    /// Events are trusted facts; nothing is validated here.
    pub fn from_events(device: DeviceName, records: &[EventRecord]) -> Self {
        let mut agg = Self::new(device);
        for record in records {
            agg.apply(&record.payload);
        }
        agg
    }

    /// The aggregate's stream id, `tc:<device>`.
    pub fn aggregate_id(&self) -> String {
        match &self.device {
            Some(dev) => dev.aggregate_id(),
            None => "tc:".to_string(),
        }
    }

    /// Current version: the number of events applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The device this aggregate owns, if any event or constructor set it.
    pub fn device(&self) -> Option<&DeviceName> {
        self.device.as_ref()
    }

    /// The root qdisc, once created.
    pub fn root_qdisc(&self) -> Option<&Qdisc> {
        self.qdiscs.values().find(|q| q.parent.is_none())
    }

    /// Look up a qdisc by handle.
    pub fn qdisc(&self, handle: Handle) -> Option<&Qdisc> {
        self.qdiscs.get(&handle)
    }

    /// Look up a class by handle.
    pub fn class(&self, handle: Handle) -> Option<&Class> {
        self.classes.get(&handle)
    }

    /// All classes, unordered.
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    /// All filters, unordered.
    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.filters.values()
    }

    /// The link ceiling declared on the root qdisc, when known.
    pub fn link_bandwidth(&self) -> Option<Bandwidth> {
        self.root_qdisc().and_then(|q| q.link_bandwidth)
    }

    /// The HTB default class that no class creation has satisfied yet.
    ///
    /// Commands may defer creating the default class; an apply step must
    /// refuse to finish while this returns `Some`.
    pub fn unresolved_htb_default_class(&self) -> Option<Handle> {
        let default = self.root_qdisc()?.htb_default_class()?;
        (!self.classes.contains_key(&default)).then_some(default)
    }

    // ------------------------------------------------------------------
    // Decide: commands in, events or domain errors out
    // ------------------------------------------------------------------

    /// Create the root HTB qdisc.
    pub fn create_htb_qdisc(
        &self,
        handle: Handle,
        default_class: Handle,
        r2q: u32,
        link_bandwidth: Option<Bandwidth>,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        self.ensure_no_qdisc()?;
        ensure_qdisc_handle(handle)?;
        if default_class.is_root() {
            return Err(Error::domain(format!(
                "htb default class must be a class handle, got {default_class}"
            )));
        }
        if default_class.major() != handle.major() {
            return Err(Error::domain(format!(
                "htb default class {default_class} must share major with qdisc {handle}"
            )));
        }
        if r2q == 0 {
            return Err(Error::domain("htb r2q must be positive"));
        }
        if let Some(link) = link_bandwidth
            && link.is_zero()
        {
            return Err(Error::domain("link bandwidth must be positive"));
        }
        Ok(vec![TcEvent::HtbQdiscCreated {
            device: device.clone(),
            handle,
            default_class,
            r2q,
            link_bandwidth,
        }])
    }

    /// Create a TBF root qdisc.
    pub fn create_tbf_qdisc(
        &self,
        handle: Handle,
        rate: Bandwidth,
        burst: u32,
        limit: u32,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        self.ensure_no_qdisc()?;
        ensure_qdisc_handle(handle)?;
        if rate.is_zero() {
            return Err(Error::domain("tbf rate must be positive"));
        }
        if burst == 0 || limit == 0 {
            return Err(Error::domain("tbf burst and limit must be positive"));
        }
        Ok(vec![TcEvent::TbfQdiscCreated {
            device: device.clone(),
            handle,
            rate,
            burst,
            limit,
        }])
    }

    /// Create a PRIO root qdisc.
    pub fn create_prio_qdisc(
        &self,
        handle: Handle,
        bands: u8,
        priomap: [u8; 16],
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        self.ensure_no_qdisc()?;
        ensure_qdisc_handle(handle)?;
        if !(1..=16).contains(&bands) {
            return Err(Error::domain(format!(
                "prio bands must be in 1..=16, got {bands}"
            )));
        }
        if let Some(entry) = priomap.iter().find(|b| **b >= bands) {
            return Err(Error::domain(format!(
                "priomap entry {entry} out of range for {bands} bands"
            )));
        }
        Ok(vec![TcEvent::PrioQdiscCreated {
            device: device.clone(),
            handle,
            bands,
            priomap,
        }])
    }

    /// Create an fq_codel root qdisc.
    pub fn create_fq_codel_qdisc(
        &self,
        handle: Handle,
        params: FqCodelParams,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        self.ensure_no_qdisc()?;
        ensure_qdisc_handle(handle)?;
        if params.limit == 0 || params.flows == 0 {
            return Err(Error::domain("fq_codel limit and flows must be positive"));
        }
        Ok(vec![TcEvent::FqCodelQdiscCreated {
            device: device.clone(),
            handle,
            params,
        }])
    }

    /// Create an HTB class under a qdisc or another class.
    pub fn create_htb_class(
        &self,
        parent: Handle,
        handle: Handle,
        name: impl Into<String>,
        priority: Priority,
        params: HtbClassParams,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        let name = name.into();

        if handle.is_root() {
            return Err(Error::domain(format!(
                "class handle must have a non-zero minor, got {handle}"
            )));
        }
        if self.qdiscs.contains_key(&handle) || self.classes.contains_key(&handle) {
            return Err(Error::domain(format!(
                "handle {handle} already in use on {device}"
            )));
        }
        self.ensure_parent_exists(parent)?;
        if let Some(qdisc) = self.qdiscs.get(&parent)
            && !matches!(qdisc.kind, QdiscKind::Htb { .. })
        {
            return Err(Error::domain(format!(
                "cannot add an htb class under a {} qdisc",
                qdisc.kind_name()
            )));
        }
        if handle.major() != parent.major() {
            return Err(Error::domain(format!(
                "class handle {handle} must share major with parent {parent}"
            )));
        }
        self.ensure_acyclic(handle, parent)?;

        if params.rate > params.ceil {
            return Err(Error::domain(format!(
                "rate ({}) exceeds ceil ({}) for class '{name}'",
                params.rate, params.ceil
            )));
        }
        if let Some(link) = self.link_bandwidth()
            && params.ceil > link
        {
            return Err(Error::domain(format!(
                "ceil ({}) exceeds link bandwidth ({link}) for class '{name}'",
                params.ceil
            )));
        }
        self.ensure_sibling_budget(parent, None, params.rate)?;

        Ok(vec![TcEvent::HtbClassCreated {
            device: device.clone(),
            parent,
            handle,
            name,
            priority,
            params,
        }])
    }

    /// Change a class's guaranteed rate and ceiling.
    pub fn change_class_bandwidth(
        &self,
        handle: Handle,
        rate: Bandwidth,
        ceil: Bandwidth,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        let class = self
            .classes
            .get(&handle)
            .ok_or_else(|| Error::domain(format!("no class {handle} on {device}")))?;
        if rate > ceil {
            return Err(Error::domain(format!(
                "rate ({rate}) exceeds ceil ({ceil}) for class '{}'",
                class.name
            )));
        }
        if let Some(link) = self.link_bandwidth()
            && ceil > link
        {
            return Err(Error::domain(format!(
                "ceil ({ceil}) exceeds link bandwidth ({link}) for class '{}'",
                class.name
            )));
        }
        self.ensure_sibling_budget(class.parent, Some(handle), rate)?;
        Ok(vec![TcEvent::ClassModified {
            device: device.clone(),
            handle,
            rate,
            ceil,
        }])
    }

    /// Change a class's priority.
    pub fn change_class_priority(&self, handle: Handle, priority: Priority) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        if !self.classes.contains_key(&handle) {
            return Err(Error::domain(format!("no class {handle} on {device}")));
        }
        Ok(vec![TcEvent::ClassPriorityChanged {
            device: device.clone(),
            handle,
            priority,
        }])
    }

    /// Delete a class that nothing references.
    pub fn delete_class(&self, handle: Handle) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        if !self.classes.contains_key(&handle) {
            return Err(Error::domain(format!("no class {handle} on {device}")));
        }
        if let Some(child) = self.classes.values().find(|c| c.parent == handle) {
            return Err(Error::domain(format!(
                "class {handle} still has child class {}",
                child.handle
            )));
        }
        if let Some(filter) = self.filters.values().find(|f| f.flow_id == handle) {
            return Err(Error::domain(format!(
                "class {handle} is the flow target of filter {}",
                filter.handle
            )));
        }
        Ok(vec![TcEvent::ClassDeleted {
            device: device.clone(),
            handle,
        }])
    }

    /// Create a filter classifying traffic under `parent` into `flow_id`.
    ///
    /// The filter handle is assigned here, deterministically from current
    /// state, and recorded in the event so replay never re-derives it.
    pub fn create_filter(
        &self,
        parent: Handle,
        priority: u16,
        protocol: FilterProtocol,
        flow_id: Handle,
        matches: Vec<Match>,
    ) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        if !self.qdiscs.contains_key(&parent) {
            return Err(Error::domain(format!(
                "filter parent {parent} is not a qdisc on {device}"
            )));
        }
        if !self.classes.contains_key(&flow_id) {
            return Err(Error::domain(format!(
                "filter flow target {flow_id} is not a class on {device}"
            )));
        }
        let handle = self.next_filter_handle()?;
        if self.filters.contains_key(&(parent, priority, handle)) {
            return Err(Error::domain(format!(
                "filter ({parent}, {priority}, {handle}) already exists on {device}"
            )));
        }
        Ok(vec![TcEvent::FilterCreated {
            device: device.clone(),
            parent,
            priority,
            handle,
            protocol,
            flow_id,
            matches,
        }])
    }

    /// Delete a filter by its full identity.
    pub fn delete_filter(&self, parent: Handle, priority: u16, handle: Handle) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        if !self.filters.contains_key(&(parent, priority, handle)) {
            return Err(Error::domain(format!(
                "no filter ({parent}, {priority}, {handle}) on {device}"
            )));
        }
        Ok(vec![TcEvent::FilterDeleted {
            device: device.clone(),
            parent,
            priority,
            handle,
        }])
    }

    /// Delete a qdisc that has no classes or filters under it.
    pub fn delete_qdisc(&self, handle: Handle) -> Result<Vec<TcEvent>> {
        let device = self.require_device()?;
        if !self.qdiscs.contains_key(&handle) {
            return Err(Error::domain(format!("no qdisc {handle} on {device}")));
        }
        if self.classes.values().any(|c| c.handle.major() == handle.major()) {
            return Err(Error::domain(format!("qdisc {handle} still has classes")));
        }
        if self.filters.values().any(|f| f.parent == handle) {
            return Err(Error::domain(format!("qdisc {handle} still has filters")));
        }
        Ok(vec![TcEvent::QdiscDeleted {
            device: device.clone(),
            handle,
        }])
    }

    // ------------------------------------------------------------------
    // Apply: mutate from trusted events
    // ------------------------------------------------------------------

    /// Apply one event. Replay uses only this; fresh commands decide,
    /// append, then their effects are observed through a reload.
    pub fn apply(&mut self, event: &TcEvent) {
        self.version += 1;
        if self.device.is_none() {
            self.device = Some(event.device().clone());
        }
        match event {
            TcEvent::HtbQdiscCreated {
                device,
                handle,
                default_class,
                r2q,
                link_bandwidth,
            } => {
                self.qdiscs.insert(
                    *handle,
                    Qdisc {
                        device: device.clone(),
                        handle: *handle,
                        parent: None,
                        kind: QdiscKind::Htb {
                            default_class: *default_class,
                            r2q: *r2q,
                        },
                        link_bandwidth: *link_bandwidth,
                    },
                );
            }
            TcEvent::TbfQdiscCreated {
                device,
                handle,
                rate,
                burst,
                limit,
            } => {
                self.qdiscs.insert(
                    *handle,
                    Qdisc {
                        device: device.clone(),
                        handle: *handle,
                        parent: None,
                        kind: QdiscKind::Tbf {
                            rate: *rate,
                            burst: *burst,
                            limit: *limit,
                        },
                        link_bandwidth: None,
                    },
                );
            }
            TcEvent::PrioQdiscCreated {
                device,
                handle,
                bands,
                priomap,
            } => {
                self.qdiscs.insert(
                    *handle,
                    Qdisc {
                        device: device.clone(),
                        handle: *handle,
                        parent: None,
                        kind: QdiscKind::Prio {
                            bands: *bands,
                            priomap: *priomap,
                        },
                        link_bandwidth: None,
                    },
                );
            }
            TcEvent::FqCodelQdiscCreated {
                device,
                handle,
                params,
            } => {
                self.qdiscs.insert(
                    *handle,
                    Qdisc {
                        device: device.clone(),
                        handle: *handle,
                        parent: None,
                        kind: QdiscKind::FqCodel(*params),
                        link_bandwidth: None,
                    },
                );
            }
            TcEvent::QdiscDeleted { handle, .. } => {
                self.qdiscs.remove(handle);
            }
            TcEvent::HtbClassCreated {
                device,
                parent,
                handle,
                name,
                priority,
                params,
            } => {
                self.classes.insert(
                    *handle,
                    Class {
                        device: device.clone(),
                        handle: *handle,
                        parent: *parent,
                        name: name.clone(),
                        priority: *priority,
                        kind: ClassKind::Htb(params.clone()),
                    },
                );
            }
            TcEvent::ClassModified {
                handle, rate, ceil, ..
            } => {
                if let Some(class) = self.classes.get_mut(handle) {
                    let ClassKind::Htb(params) = &mut class.kind;
                    params.rate = *rate;
                    params.ceil = *ceil;
                }
            }
            TcEvent::ClassPriorityChanged {
                handle, priority, ..
            } => {
                if let Some(class) = self.classes.get_mut(handle) {
                    class.priority = *priority;
                }
            }
            TcEvent::ClassDeleted { handle, .. } => {
                self.classes.remove(handle);
            }
            TcEvent::FilterCreated {
                device,
                parent,
                priority,
                handle,
                protocol,
                flow_id,
                matches,
            } => {
                self.filters.insert(
                    (*parent, *priority, *handle),
                    Filter {
                        device: device.clone(),
                        parent: *parent,
                        priority: *priority,
                        handle: *handle,
                        protocol: *protocol,
                        flow_id: *flow_id,
                        matches: matches.clone(),
                    },
                );
            }
            TcEvent::FilterDeleted {
                parent,
                priority,
                handle,
                ..
            } => {
                self.filters.remove(&(*parent, *priority, *handle));
            }
            // Compensation and notification events occupy stream versions
            // (when appended) but do not change topology.
            TcEvent::QdiscApplyFailed { .. }
            | TcEvent::ClassApplyFailed { .. }
            | TcEvent::FilterApplyFailed { .. }
            | TcEvent::StatisticsSampled { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Invariant helpers
    // ------------------------------------------------------------------

    fn require_device(&self) -> Result<&DeviceName> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::validation("aggregate has no device"))
    }

    fn ensure_no_qdisc(&self) -> Result<()> {
        if let Some(existing) = self.qdiscs.values().next() {
            return Err(Error::domain(format!(
                "device {} already has a {} qdisc at {}",
                existing.device,
                existing.kind_name(),
                existing.handle
            )));
        }
        Ok(())
    }

    fn ensure_parent_exists(&self, parent: Handle) -> Result<()> {
        if self.qdiscs.contains_key(&parent) || self.classes.contains_key(&parent) {
            return Ok(());
        }
        Err(Error::domain(format!(
            "parent {parent} does not exist on {}",
            self.require_device()?
        )))
    }

    /// Walk ancestors of `parent` by handle; creating `handle` under it
    /// must not close a loop. Parents are handles, not pointers, so this
    /// is an iterative walk with a visited set.
    fn ensure_acyclic(&self, handle: Handle, parent: Handle) -> Result<()> {
        let mut visited = HashSet::new();
        let mut cursor = parent;
        loop {
            if cursor == handle {
                return Err(Error::domain(format!(
                    "class {handle} would be its own ancestor"
                )));
            }
            if !visited.insert(cursor) {
                // Pre-existing loop in stored state; refuse to extend it.
                return Err(Error::domain(format!(
                    "parent chain of {parent} already contains a cycle"
                )));
            }
            match self.classes.get(&cursor) {
                Some(class) => cursor = class.parent,
                None => return Ok(()),
            }
        }
    }

    /// Sibling-sum rule: guaranteed rates under `parent` must fit the
    /// parent's budget (its ceil when `parent` is a class, the declared
    /// link bandwidth when `parent` is the root qdisc). Unknown budgets
    /// are not enforced.
    fn ensure_sibling_budget(
        &self,
        parent: Handle,
        replacing: Option<Handle>,
        rate: Bandwidth,
    ) -> Result<()> {
        let budget = if let Some(class) = self.classes.get(&parent) {
            Some((class.ceil(), format!("ceil of parent class {parent}")))
        } else {
            self.link_bandwidth()
                .map(|link| (link, "link bandwidth".to_string()))
        };
        let Some((budget, what)) = budget else {
            return Ok(());
        };

        let mut sum = rate;
        for class in self.classes.values() {
            if class.parent == parent && Some(class.handle) != replacing {
                sum = sum.saturating_add(class.rate());
            }
        }
        if sum > budget {
            return Err(Error::domain(format!(
                "guaranteed rates under {parent} sum to {sum}, exceeding the {what} ({budget})"
            )));
        }
        Ok(())
    }

    fn next_filter_handle(&self) -> Result<Handle> {
        let next_minor = self
            .filters
            .values()
            .filter(|f| f.handle.major() == FILTER_HANDLE_MAJOR)
            .map(|f| f.handle.minor())
            .max()
            .map_or(1, |m| m + 1);
        Handle::new(FILTER_HANDLE_MAJOR, next_minor)
    }
}

/// Qdiscs sit at `major:0`.
fn ensure_qdisc_handle(handle: Handle) -> Result<()> {
    if !handle.is_root() {
        return Err(Error::domain(format!(
            "qdisc handle must have minor 0, got {handle}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> DeviceName {
        DeviceName::new("eth0").unwrap()
    }

    fn h(s: &str) -> Handle {
        s.parse().unwrap()
    }

    fn htb_root(agg: &mut TrafficControlAggregate, link: &str) {
        let events = agg
            .create_htb_qdisc(
                h("1:0"),
                h("1:999"),
                10,
                Some(link.parse().unwrap()),
            )
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
    }

    fn add_class(agg: &mut TrafficControlAggregate, handle: &str, rate: &str, ceil: &str) {
        let events = agg
            .create_htb_class(
                h("1:0"),
                h(handle),
                format!("class-{handle}"),
                Priority::new(1).unwrap(),
                HtbClassParams::new(rate.parse().unwrap(), ceil.parse().unwrap()),
            )
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
    }

    #[test]
    fn test_htb_qdisc_uniqueness() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        let err = agg
            .create_htb_qdisc(h("2:0"), h("2:999"), 10, None)
            .unwrap_err();
        assert!(err.to_string().contains("already has a htb qdisc"));
    }

    #[test]
    fn test_qdisc_handle_must_be_root() {
        let agg = TrafficControlAggregate::new(dev());
        assert!(agg.create_htb_qdisc(h("1:1"), h("1:999"), 10, None).is_err());
    }

    #[test]
    fn test_class_requires_parent() {
        let agg = TrafficControlAggregate::new(dev());
        let err = agg
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "web",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(1), Bandwidth::megabits(2)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("parent 1:0 does not exist"));
    }

    #[test]
    fn test_class_duplicate_handle() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "1mbit", "2mbit");
        let err = agg
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "dup",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(1), Bandwidth::megabits(2)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_class_rate_above_ceil() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        let err = agg
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "web",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(5), Bandwidth::megabits(2)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("rate (5mbit) exceeds ceil (2mbit)"));
    }

    #[test]
    fn test_class_ceil_above_link() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        let err = agg
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "web",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(5), Bandwidth::megabits(20)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("exceeds link bandwidth (10mbit)"));
    }

    #[test]
    fn test_sibling_rates_capped_by_link() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "6mbit", "10mbit");
        let err = agg
            .create_htb_class(
                h("1:0"),
                h("1:11"),
                "bulk",
                Priority::LOWEST,
                HtbClassParams::new(Bandwidth::megabits(5), Bandwidth::megabits(10)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("exceeding the link bandwidth"));
    }

    #[test]
    fn test_sibling_rates_capped_by_parent_ceil() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "100mbit");
        add_class(&mut agg, "1:10", "10mbit", "20mbit");

        // Two children of 1:10 whose rates fit individually but not together.
        let events = agg
            .create_htb_class(
                h("1:10"),
                h("1:20"),
                "a",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(15), Bandwidth::megabits(20)),
            )
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
        let err = agg
            .create_htb_class(
                h("1:10"),
                h("1:21"),
                "b",
                Priority::HIGHEST,
                HtbClassParams::new(Bandwidth::megabits(10), Bandwidth::megabits(20)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("ceil of parent class 1:10"));
    }

    #[test]
    fn test_modify_class_respects_budget() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "4mbit", "10mbit");
        add_class(&mut agg, "1:11", "4mbit", "10mbit");

        // Growing 1:10 to 7mbit would push the sibling sum to 11mbit.
        assert!(
            agg.change_class_bandwidth(h("1:10"), Bandwidth::megabits(7), Bandwidth::megabits(10))
                .is_err()
        );
        // Growing within budget is fine, and replaces the old rate rather
        // than double-counting it.
        assert!(
            agg.change_class_bandwidth(h("1:10"), Bandwidth::megabits(6), Bandwidth::megabits(10))
                .is_ok()
        );
    }

    #[test]
    fn test_filter_requires_qdisc_parent_and_class_target() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        let err = agg
            .create_filter(h("1:0"), 100, FilterProtocol::Ip, h("1:10"), vec![])
            .unwrap_err();
        assert!(err.to_string().contains("not a class"));

        add_class(&mut agg, "1:10", "1mbit", "2mbit");
        let events = agg
            .create_filter(
                h("1:0"),
                100,
                FilterProtocol::Ip,
                h("1:10"),
                vec![Match::dst_port(80)],
            )
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_filter_handles_are_sequential() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "1mbit", "2mbit");
        for priority in [100u16, 101, 100] {
            let events = agg
                .create_filter(
                    h("1:0"),
                    priority,
                    FilterProtocol::Ip,
                    h("1:10"),
                    vec![Match::dst_port(80)],
                )
                .unwrap();
            for e in &events {
                agg.apply(e);
            }
        }
        let mut handles: Vec<_> = agg.filters().map(|f| f.handle.to_string()).collect();
        handles.sort();
        assert_eq!(handles, vec!["2048:1", "2048:2", "2048:3"]);
    }

    #[test]
    fn test_delete_class_blocked_by_references() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "1mbit", "2mbit");
        let events = agg
            .create_filter(
                h("1:0"),
                100,
                FilterProtocol::Ip,
                h("1:10"),
                vec![Match::dst_port(22)],
            )
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
        let err = agg.delete_class(h("1:10")).unwrap_err();
        assert!(err.to_string().contains("flow target"));
    }

    #[test]
    fn test_delete_qdisc_blocked_by_classes() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        add_class(&mut agg, "1:10", "1mbit", "2mbit");
        assert!(agg.delete_qdisc(h("1:0")).is_err());

        let events = agg.delete_class(h("1:10")).unwrap();
        for e in &events {
            agg.apply(e);
        }
        assert!(agg.delete_qdisc(h("1:0")).is_ok());
    }

    #[test]
    fn test_unresolved_default_class() {
        let mut agg = TrafficControlAggregate::new(dev());
        htb_root(&mut agg, "10mbit");
        assert_eq!(agg.unresolved_htb_default_class(), Some(h("1:999")));
        add_class(&mut agg, "1:999", "1mbit", "10mbit");
        assert_eq!(agg.unresolved_htb_default_class(), None);
    }

    #[test]
    fn test_replay_matches_live_state() {
        let mut live = TrafficControlAggregate::new(dev());
        let mut log = Vec::new();
        let mut record = |agg: &mut TrafficControlAggregate, events: Vec<TcEvent>| {
            for e in &events {
                agg.apply(e);
            }
            log.extend(events);
        };

        let created_qdisc = live
            .create_htb_qdisc(h("1:0"), h("1:999"), 10, Some(Bandwidth::megabits(10)))
            .unwrap();
        record(&mut live, created_qdisc);

        let created_class = live
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "web",
                Priority::new(1).unwrap(),
                HtbClassParams::new(Bandwidth::megabits(2), Bandwidth::megabits(5)),
            )
            .unwrap();
        record(&mut live, created_class);

        let created_filter = live
            .create_filter(
                h("1:0"),
                100,
                FilterProtocol::Ip,
                h("1:10"),
                vec![Match::dst_port(80)],
            )
            .unwrap();
        record(&mut live, created_filter);

        let changed_bandwidth = live
            .change_class_bandwidth(h("1:10"), Bandwidth::megabits(3), Bandwidth::megabits(5))
            .unwrap();
        record(&mut live, changed_bandwidth);

        let records: Vec<EventRecord> = log
            .iter()
            .enumerate()
            .map(|(i, payload)| EventRecord {
                aggregate_id: "tc:eth0".into(),
                version: i as u64 + 1,
                timestamp: chrono::Utc::now(),
                payload: payload.clone(),
            })
            .collect();
        let replayed = TrafficControlAggregate::from_events(dev(), &records);

        assert_eq!(replayed.version(), live.version());
        assert_eq!(
            replayed.class(h("1:10")).unwrap().rate(),
            Bandwidth::megabits(3)
        );
        assert_eq!(replayed.filters().count(), live.filters().count());
        assert_eq!(
            replayed.root_qdisc().unwrap().handle,
            live.root_qdisc().unwrap().handle
        );
    }
}
