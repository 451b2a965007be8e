//! Declarative bandwidth policies.
//!
//! A [`TrafficPolicy`] describes what the operator wants in human terms:
//! a link ceiling and a list of named classes with guaranteed/maximum
//! bandwidth, a priority, and traffic filters. Building one is
//! side-effect-free; [`TrafficPolicy::commands`] compiles it into the
//! command sequence that realizes it.
//!
//! # Example
//!
//! ```
//! use tcflow::policy::{TrafficClass, TrafficPolicy};
//!
//! let policy = TrafficPolicy::new("eth0")?
//!     .total_bandwidth("10mbit")?
//!     .class(
//!         TrafficClass::new("web")
//!             .guaranteed("2mbit")?
//!             .burstable_to("5mbit")?
//!             .priority(1)
//!             .dest_port(80)
//!             .dest_port(443),
//!     )
//!     .class(
//!         TrafficClass::new("ssh")
//!             .guaranteed("1mbit")?
//!             .burstable_to("3mbit")?
//!             .priority(0)
//!             .ssh(),
//!     );
//! let commands = policy.commands()?;
//! assert!(!commands.is_empty());
//! # Ok::<(), tcflow::Error>(())
//! ```

pub mod translator;

use crate::domain::filter::{Match, MatchKind};
use crate::error::Result;
use crate::types::{Bandwidth, DeviceName, Priority};

pub use translator::{PolicyCommand, translate};

/// One traffic filter in a policy, by what it matches.
///
/// Unknown application names compile to no match entries, and a filter
/// without match entries is dropped from the output entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// Match on source IP or CIDR.
    SourceIp(String),
    /// Match on destination IP or CIDR.
    DestIp(String),
    /// Match on source port.
    SourcePort(u16),
    /// Match on destination port.
    DestPort(u16),
    /// Match on IP protocol name.
    Protocol(String),
    /// Match a well-known application by name (ssh, http, https, dns).
    Application(String),
}

impl FilterSpec {
    /// Compile to wire-format match predicates.
    pub fn matches(&self) -> Vec<Match> {
        match self {
            Self::SourceIp(ip) => vec![Match::new(MatchKind::SrcIp, ip.clone())],
            Self::DestIp(ip) => vec![Match::new(MatchKind::DstIp, ip.clone())],
            Self::SourcePort(port) => vec![Match::src_port(*port)],
            Self::DestPort(port) => vec![Match::dst_port(*port)],
            Self::Protocol(name) => vec![Match::new(MatchKind::Protocol, name.to_lowercase())],
            Self::Application(name) => match application_port(name) {
                Some(port) => vec![Match::dst_port(port)],
                None => Vec::new(),
            },
        }
    }
}

/// Destination port for a well-known application name.
fn application_port(name: &str) -> Option<u16> {
    match name.to_lowercase().as_str() {
        "ssh" => Some(22),
        "http" => Some(80),
        "https" => Some(443),
        "dns" => Some(53),
        _ => None,
    }
}

/// A named traffic class in a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficClass {
    pub(crate) name: String,
    pub(crate) guaranteed: Option<Bandwidth>,
    pub(crate) max: Option<Bandwidth>,
    pub(crate) priority: Option<Priority>,
    pub(crate) filters: Vec<FilterSpec>,
}

impl TrafficClass {
    /// Start a class description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guaranteed: None,
            max: None,
            priority: None,
            filters: Vec::new(),
        }
    }

    /// Guaranteed bandwidth, from a rate string (e.g. "300mbit").
    pub fn guaranteed(mut self, rate: &str) -> Result<Self> {
        self.guaranteed = Some(rate.parse()?);
        Ok(self)
    }

    /// Guaranteed bandwidth, as a value.
    pub fn guaranteed_bandwidth(mut self, rate: Bandwidth) -> Self {
        self.guaranteed = Some(rate);
        self
    }

    /// Maximum bandwidth, from a rate string.
    pub fn max(mut self, rate: &str) -> Result<Self> {
        self.max = Some(rate.parse()?);
        Ok(self)
    }

    /// Maximum bandwidth, as a value.
    pub fn max_bandwidth(mut self, rate: Bandwidth) -> Self {
        self.max = Some(rate);
        self
    }

    /// Alias for [`TrafficClass::max`].
    pub fn burstable_to(self, rate: &str) -> Result<Self> {
        self.max(rate)
    }

    /// Scheduling priority, clamped into 0..=7 (0 highest).
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(Priority::clamped(priority));
        self
    }

    /// Filter on source IP or CIDR.
    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.filters.push(FilterSpec::SourceIp(ip.into()));
        self
    }

    /// Filter on destination IP or CIDR.
    pub fn dest_ip(mut self, ip: impl Into<String>) -> Self {
        self.filters.push(FilterSpec::DestIp(ip.into()));
        self
    }

    /// Filter on source port.
    pub fn source_port(mut self, port: u16) -> Self {
        self.filters.push(FilterSpec::SourcePort(port));
        self
    }

    /// Filter on destination port.
    pub fn dest_port(mut self, port: u16) -> Self {
        self.filters.push(FilterSpec::DestPort(port));
        self
    }

    /// Filter on IP protocol name (tcp, udp, icmp, ...).
    pub fn protocol(mut self, name: impl Into<String>) -> Self {
        self.filters.push(FilterSpec::Protocol(name.into()));
        self
    }

    /// Filter on a well-known application name.
    pub fn application(mut self, name: impl Into<String>) -> Self {
        self.filters.push(FilterSpec::Application(name.into()));
        self
    }

    /// Filter SSH traffic (port 22).
    pub fn ssh(self) -> Self {
        self.application("ssh")
    }

    /// Filter HTTP traffic (port 80).
    pub fn http(self) -> Self {
        self.application("http")
    }

    /// Filter HTTPS traffic (port 443).
    pub fn https(self) -> Self {
        self.application("https")
    }
}

/// A complete bandwidth policy for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficPolicy {
    pub(crate) device: DeviceName,
    pub(crate) total: Option<Bandwidth>,
    pub(crate) classes: Vec<TrafficClass>,
}

impl TrafficPolicy {
    /// Start a policy for a device name.
    pub fn new(device: &str) -> Result<Self> {
        Ok(Self::for_device(DeviceName::new(device)?))
    }

    /// Start a policy for an already-validated device.
    pub fn for_device(device: DeviceName) -> Self {
        Self {
            device,
            total: None,
            classes: Vec::new(),
        }
    }

    /// Physical link bandwidth, from a rate string.
    pub fn total_bandwidth(mut self, rate: &str) -> Result<Self> {
        self.total = Some(rate.parse()?);
        Ok(self)
    }

    /// Physical link bandwidth, as a value.
    pub fn total(mut self, rate: Bandwidth) -> Self {
        self.total = Some(rate);
        self
    }

    /// Append a class. Order is preserved and determines handle
    /// assignment.
    pub fn class(mut self, class: TrafficClass) -> Self {
        self.classes.push(class);
        self
    }

    /// The device this policy targets.
    pub fn device(&self) -> &DeviceName {
        &self.device
    }

    /// Compile the policy into its command sequence. Validates the whole
    /// policy first; no command is produced on error.
    pub fn commands(&self) -> Result<Vec<PolicyCommand>> {
        translate(self)
    }
}
