//! Flat read views.
//!
//! Views are explicit compositions: the builder inspects the tagged
//! variant and copies base and scheduler-specific fields into one flat
//! struct, which serializes cleanly as a read-model document.

use serde::{Deserialize, Serialize};

use crate::domain::filter::Match;
use crate::domain::{Class, ClassKind, Filter, Qdisc, QdiscKind, TrafficControlAggregate};
use crate::types::{Bandwidth, Handle};

/// Flat view of a qdisc; scheduler-specific fields are `None` when they
/// do not apply to the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdiscView {
    /// Qdisc handle.
    pub handle: Handle,
    /// Scheduler name ("htb", "tbf", "prio", "fq_codel").
    pub kind: String,
    /// Parent handle; `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Handle>,
    /// HTB: class for unclassified traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_class: Option<Handle>,
    /// HTB: quantum divisor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2q: Option<u32>,
    /// HTB: declared link ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_bandwidth: Option<Bandwidth>,
    /// TBF: shaping rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Bandwidth>,
    /// TBF: bucket size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    /// TBF / fq_codel: queue limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// PRIO: number of bands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<u8>,
    /// fq_codel: CoDel target in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_us: Option<u32>,
    /// fq_codel: number of flow queues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<u32>,
}

impl From<&Qdisc> for QdiscView {
    fn from(qdisc: &Qdisc) -> Self {
        let mut view = Self {
            handle: qdisc.handle,
            kind: qdisc.kind_name().to_string(),
            parent: qdisc.parent,
            default_class: None,
            r2q: None,
            link_bandwidth: None,
            rate: None,
            burst: None,
            limit: None,
            bands: None,
            target_us: None,
            flows: None,
        };
        match &qdisc.kind {
            QdiscKind::Htb { default_class, r2q } => {
                view.default_class = Some(*default_class);
                view.r2q = Some(*r2q);
                view.link_bandwidth = qdisc.link_bandwidth;
            }
            QdiscKind::Tbf { rate, burst, limit } => {
                view.rate = Some(*rate);
                view.burst = Some(*burst);
                view.limit = Some(*limit);
            }
            QdiscKind::Prio { bands, .. } => {
                view.bands = Some(*bands);
            }
            QdiscKind::FqCodel(params) => {
                view.limit = Some(params.limit);
                view.target_us = Some(params.target_us);
                view.flows = Some(params.flows);
            }
        }
        view
    }
}

/// Flat view of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassView {
    /// Class handle.
    pub handle: Handle,
    /// Parent qdisc or class.
    pub parent: Handle,
    /// Human-readable name.
    pub name: String,
    /// Scheduling priority.
    pub priority: u8,
    /// Guaranteed rate.
    pub rate: Bandwidth,
    /// Borrowing ceiling.
    pub ceil: Bandwidth,
    /// Burst buffer in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    /// Ceil burst buffer in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cburst: Option<u32>,
    /// Bytes served per round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum: Option<u32>,
}

impl From<&Class> for ClassView {
    fn from(class: &Class) -> Self {
        let ClassKind::Htb(params) = &class.kind;
        Self {
            handle: class.handle,
            parent: class.parent,
            name: class.name.clone(),
            priority: class.priority.value(),
            rate: params.rate,
            ceil: params.ceil,
            burst: params.burst,
            cburst: params.cburst,
            quantum: params.quantum,
        }
    }
}

/// Flat view of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterView {
    /// The classifying qdisc.
    pub parent: Handle,
    /// Ordering among siblings.
    pub priority: u16,
    /// Filter handle.
    pub handle: Handle,
    /// Classified protocol.
    pub protocol: String,
    /// Target class.
    pub flow_id: Handle,
    /// Match predicates.
    pub matches: Vec<Match>,
}

impl From<&Filter> for FilterView {
    fn from(filter: &Filter) -> Self {
        Self {
            parent: filter.parent,
            priority: filter.priority,
            handle: filter.handle,
            protocol: filter.protocol.to_string(),
            flow_id: filter.flow_id,
            matches: filter.matches.clone(),
        }
    }
}

/// The whole configured topology of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyView {
    /// Interface name.
    pub device: String,
    /// Aggregate version the view reflects.
    pub version: u64,
    /// Qdiscs, ordered by handle.
    pub qdiscs: Vec<QdiscView>,
    /// Classes, ordered by handle.
    pub classes: Vec<ClassView>,
    /// Filters, ordered by (parent, priority, handle).
    pub filters: Vec<FilterView>,
    /// Most recent kernel apply failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_apply_failure: Option<String>,
}

impl TopologyView {
    /// Build a view from an aggregate. Output ordering is fixed so the
    /// same event stream always yields a byte-identical document.
    pub fn from_aggregate(
        aggregate: &TrafficControlAggregate,
        last_apply_failure: Option<String>,
    ) -> Self {
        let device = aggregate
            .device()
            .map(|d| d.as_str().to_string())
            .unwrap_or_default();

        let mut qdiscs: Vec<QdiscView> = Vec::new();
        if let Some(root) = aggregate.root_qdisc() {
            qdiscs.push(root.into());
        }

        let mut classes: Vec<ClassView> = aggregate.classes().map(Into::into).collect();
        classes.sort_by_key(|c| c.handle);

        let mut filters: Vec<FilterView> = aggregate.filters().map(Into::into).collect();
        filters.sort_by_key(|f| (f.parent, f.priority, f.handle));

        Self {
            device,
            version: aggregate.version(),
            qdiscs,
            classes,
            filters,
            last_apply_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::FilterProtocol;
    use crate::domain::HtbClassParams;
    use crate::types::{DeviceName, Priority};

    fn h(s: &str) -> Handle {
        s.parse().unwrap()
    }

    fn sample_aggregate() -> TrafficControlAggregate {
        let mut agg = TrafficControlAggregate::new(DeviceName::new("eth0").unwrap());
        let steps: Vec<Vec<crate::event::TcEvent>> = vec![
            agg.create_htb_qdisc(h("1:0"), h("1:999"), 10, Some(Bandwidth::megabits(10)))
                .unwrap(),
        ];
        for events in steps {
            for e in &events {
                agg.apply(e);
            }
        }
        let events = agg
            .create_htb_class(
                h("1:0"),
                h("1:10"),
                "web",
                Priority::new(1).unwrap(),
                HtbClassParams::new(Bandwidth::megabits(2), Bandwidth::megabits(5)),
            )
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
        let events = agg
            .create_filter(h("1:0"), 100, FilterProtocol::Ip, h("1:10"), vec![Match::dst_port(80)])
            .unwrap();
        for e in &events {
            agg.apply(e);
        }
        agg
    }

    #[test]
    fn test_view_flattens_variants() {
        let view = TopologyView::from_aggregate(&sample_aggregate(), None);
        assert_eq!(view.device, "eth0");
        assert_eq!(view.version, 3);

        let qdisc = &view.qdiscs[0];
        assert_eq!(qdisc.kind, "htb");
        assert_eq!(qdisc.default_class, Some(h("1:999")));
        assert_eq!(qdisc.rate, None);

        let class = &view.classes[0];
        assert_eq!(class.name, "web");
        assert_eq!(class.rate, Bandwidth::megabits(2));

        let filter = &view.filters[0];
        assert_eq!(filter.protocol, "ip");
        assert_eq!(filter.flow_id, h("1:10"));
        assert_eq!(filter.matches.len(), 1);
    }

    #[test]
    fn test_view_serialization_is_deterministic() {
        let agg = sample_aggregate();
        let a = serde_json::to_string(&TopologyView::from_aggregate(&agg, None)).unwrap();
        let b = serde_json::to_string(&TopologyView::from_aggregate(&agg, None)).unwrap();
        assert_eq!(a, b);
    }
}
