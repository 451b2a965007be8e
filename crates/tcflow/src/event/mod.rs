//! Domain events and the versioned record envelope.
//!
//! Events are immutable facts. Current state is never stored; it is
//! derived by replaying an aggregate's event stream in version order.
//! The persisted layout of a record is
//! `{aggregate_id, version, timestamp, kind, payload}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::class::HtbClassParams;
use crate::domain::filter::{FilterProtocol, Match};
use crate::domain::qdisc::FqCodelParams;
use crate::stats::sample::RawSample;
use crate::types::{Bandwidth, DeviceName, Handle, Priority};

/// A domain event payload.
///
/// Every variant carries the full set of domain attributes needed to
/// apply it without consulting other state, so replay never validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum TcEvent {
    /// An HTB root qdisc was created.
    #[serde(rename = "HTBQdiscCreated")]
    HtbQdiscCreated {
        device: DeviceName,
        handle: Handle,
        default_class: Handle,
        r2q: u32,
        link_bandwidth: Option<Bandwidth>,
    },
    /// A TBF qdisc was created.
    #[serde(rename = "TBFQdiscCreated")]
    TbfQdiscCreated {
        device: DeviceName,
        handle: Handle,
        rate: Bandwidth,
        burst: u32,
        limit: u32,
    },
    /// A PRIO qdisc was created.
    #[serde(rename = "PRIOQdiscCreated")]
    PrioQdiscCreated {
        device: DeviceName,
        handle: Handle,
        bands: u8,
        priomap: [u8; 16],
    },
    /// An fq_codel qdisc was created.
    #[serde(rename = "FQCODELQdiscCreated")]
    FqCodelQdiscCreated {
        device: DeviceName,
        handle: Handle,
        params: FqCodelParams,
    },
    /// A qdisc was removed.
    QdiscDeleted { device: DeviceName, handle: Handle },
    /// An HTB class was created.
    #[serde(rename = "HTBClassCreated")]
    HtbClassCreated {
        device: DeviceName,
        parent: Handle,
        handle: Handle,
        name: String,
        priority: Priority,
        params: HtbClassParams,
    },
    /// A class's rate/ceil changed.
    ClassModified {
        device: DeviceName,
        handle: Handle,
        rate: Bandwidth,
        ceil: Bandwidth,
    },
    /// A class's priority changed.
    ClassPriorityChanged {
        device: DeviceName,
        handle: Handle,
        priority: Priority,
    },
    /// A class was removed.
    ClassDeleted { device: DeviceName, handle: Handle },
    /// A filter was created.
    FilterCreated {
        device: DeviceName,
        parent: Handle,
        priority: u16,
        handle: Handle,
        protocol: FilterProtocol,
        flow_id: Handle,
        matches: Vec<Match>,
    },
    /// A filter was removed.
    FilterDeleted {
        device: DeviceName,
        parent: Handle,
        priority: u16,
        handle: Handle,
    },
    /// The kernel refused a qdisc apply; the intent event above it stands.
    QdiscApplyFailed {
        device: DeviceName,
        handle: Handle,
        reason: String,
    },
    /// The kernel refused a class apply.
    ClassApplyFailed {
        device: DeviceName,
        handle: Handle,
        reason: String,
    },
    /// The kernel refused a filter apply.
    FilterApplyFailed {
        device: DeviceName,
        parent: Handle,
        priority: u16,
        handle: Handle,
        reason: String,
    },
    /// A statistics sample was collected. Published on the event bus for
    /// the time-series collector; never appended to an aggregate stream.
    StatisticsSampled { device: DeviceName, sample: RawSample },
}

impl TcEvent {
    /// The stable event kind name, as persisted.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HtbQdiscCreated { .. } => "HTBQdiscCreated",
            Self::TbfQdiscCreated { .. } => "TBFQdiscCreated",
            Self::PrioQdiscCreated { .. } => "PRIOQdiscCreated",
            Self::FqCodelQdiscCreated { .. } => "FQCODELQdiscCreated",
            Self::QdiscDeleted { .. } => "QdiscDeleted",
            Self::HtbClassCreated { .. } => "HTBClassCreated",
            Self::ClassModified { .. } => "ClassModified",
            Self::ClassPriorityChanged { .. } => "ClassPriorityChanged",
            Self::ClassDeleted { .. } => "ClassDeleted",
            Self::FilterCreated { .. } => "FilterCreated",
            Self::FilterDeleted { .. } => "FilterDeleted",
            Self::QdiscApplyFailed { .. } => "QdiscApplyFailed",
            Self::ClassApplyFailed { .. } => "ClassApplyFailed",
            Self::FilterApplyFailed { .. } => "FilterApplyFailed",
            Self::StatisticsSampled { .. } => "StatisticsSampled",
        }
    }

    /// The device this event concerns.
    pub fn device(&self) -> &DeviceName {
        match self {
            Self::HtbQdiscCreated { device, .. }
            | Self::TbfQdiscCreated { device, .. }
            | Self::PrioQdiscCreated { device, .. }
            | Self::FqCodelQdiscCreated { device, .. }
            | Self::QdiscDeleted { device, .. }
            | Self::HtbClassCreated { device, .. }
            | Self::ClassModified { device, .. }
            | Self::ClassPriorityChanged { device, .. }
            | Self::ClassDeleted { device, .. }
            | Self::FilterCreated { device, .. }
            | Self::FilterDeleted { device, .. }
            | Self::QdiscApplyFailed { device, .. }
            | Self::ClassApplyFailed { device, .. }
            | Self::FilterApplyFailed { device, .. }
            | Self::StatisticsSampled { device, .. } => device,
        }
    }

    /// The failure reason, for `*ApplyFailed` compensation events.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::QdiscApplyFailed { reason, .. }
            | Self::ClassApplyFailed { reason, .. }
            | Self::FilterApplyFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// True for the `*ApplyFailed` compensation events.
    pub fn is_apply_failure(&self) -> bool {
        matches!(
            self,
            Self::QdiscApplyFailed { .. }
                | Self::ClassApplyFailed { .. }
                | Self::FilterApplyFailed { .. }
        )
    }
}

/// A persisted event: payload plus stream position.
///
/// Versions within an aggregate are strictly monotonic with no gaps,
/// starting at 1 for the first event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Aggregate stream id, `tc:<device>`.
    pub aggregate_id: String,
    /// Position in the stream, 1-based.
    pub version: u64,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// The domain payload, serialized as `kind` + `payload`.
    #[serde(flatten)]
    pub payload: TcEvent,
}

impl EventRecord {
    /// The stable event kind name.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// An unversioned record, used for bus-only notifications such as
    /// statistics samples that never touch an aggregate stream.
    pub fn notification(payload: TcEvent) -> Self {
        Self {
            aggregate_id: payload.device().aggregate_id(),
            version: 0,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> DeviceName {
        DeviceName::new("eth0").unwrap()
    }

    #[test]
    fn test_kind_names_match_persisted_layout() {
        let event = TcEvent::HtbQdiscCreated {
            device: dev(),
            handle: Handle::root(1).unwrap(),
            default_class: Handle::new(1, 999).unwrap(),
            r2q: 10,
            link_bandwidth: None,
        };
        assert_eq!(event.kind(), "HTBQdiscCreated");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "HTBQdiscCreated");
        assert_eq!(json["payload"]["handle"], "1:0");
    }

    #[test]
    fn test_record_roundtrip() {
        let record = EventRecord {
            aggregate_id: "tc:eth0".into(),
            version: 1,
            timestamp: Utc::now(),
            payload: TcEvent::ClassDeleted {
                device: dev(),
                handle: Handle::new(1, 10).unwrap(),
            },
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.kind(), "ClassDeleted");
    }

    #[test]
    fn test_record_layout_has_kind_at_top_level() {
        let record = EventRecord {
            aggregate_id: "tc:eth0".into(),
            version: 3,
            timestamp: Utc::now(),
            payload: TcEvent::QdiscDeleted {
                device: dev(),
                handle: Handle::root(1).unwrap(),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["aggregate_id"], "tc:eth0");
        assert_eq!(json["version"], 3);
        assert_eq!(json["kind"], "QdiscDeleted");
        assert!(json["payload"].is_object());
    }

    #[test]
    fn test_apply_failure_classification() {
        let event = TcEvent::ClassApplyFailed {
            device: dev(),
            handle: Handle::new(1, 10).unwrap(),
            reason: "EPERM".into(),
        };
        assert!(event.is_apply_failure());
    }
}
