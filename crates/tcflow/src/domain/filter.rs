//! Classifier (filter) entities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DeviceName, Handle};

/// Protocol a filter classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterProtocol {
    /// Match every protocol.
    All,
    /// IPv4.
    Ip,
    /// IPv6.
    Ipv6,
}

impl fmt::Display for FilterProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::Ip => "ip",
            Self::Ipv6 => "ipv6",
        };
        f.write_str(s)
    }
}

impl FromStr for FilterProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "ip" => Ok(Self::Ip),
            "ipv6" => Ok(Self::Ipv6),
            _ => Err(Error::validation(format!("unknown filter protocol: {s}"))),
        }
    }
}

/// What a match predicate inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Source IP address or CIDR.
    SrcIp,
    /// Destination IP address or CIDR.
    DstIp,
    /// Source TCP/UDP port.
    SrcPort,
    /// Destination TCP/UDP port.
    DstPort,
    /// IP protocol name (tcp, udp, icmp, ...).
    Protocol,
    /// Netfilter firewall mark.
    FwMark,
}

impl MatchKind {
    /// Key used in the wire-format match map.
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::SrcIp => "src_ip",
            Self::DstIp => "dst_ip",
            Self::SrcPort => "src_port",
            Self::DstPort => "dst_port",
            Self::Protocol => "protocol",
            Self::FwMark => "fw_mark",
        }
    }
}

/// One match predicate: a kind plus its value.
///
/// Values are IPs (dotted-quad or CIDR), decimal port numbers, or
/// lowercase protocol names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// What this predicate inspects.
    pub kind: MatchKind,
    /// The value to match against.
    pub value: String,
}

impl Match {
    /// Create a match predicate.
    pub fn new(kind: MatchKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Match on destination port.
    pub fn dst_port(port: u16) -> Self {
        Self::new(MatchKind::DstPort, port.to_string())
    }

    /// Match on source port.
    pub fn src_port(port: u16) -> Self {
        Self::new(MatchKind::SrcPort, port.to_string())
    }
}

/// A classifier that steers packets into a class.
///
/// Identity within an aggregate is `(device, parent, priority, handle)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Interface the filter lives on.
    pub device: DeviceName,
    /// The classifying qdisc.
    pub parent: Handle,
    /// Ordering among siblings; lower runs first.
    pub priority: u16,
    /// Filter handle.
    pub handle: Handle,
    /// Protocol to classify.
    pub protocol: FilterProtocol,
    /// Target class for matched packets.
    pub flow_id: Handle,
    /// Ordered match predicates; all must hold.
    pub matches: Vec<Match>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_roundtrip() {
        for p in [FilterProtocol::All, FilterProtocol::Ip, FilterProtocol::Ipv6] {
            assert_eq!(p.to_string().parse::<FilterProtocol>().unwrap(), p);
        }
        assert!("tcp".parse::<FilterProtocol>().is_err());
    }

    #[test]
    fn test_wire_keys() {
        assert_eq!(MatchKind::SrcIp.wire_key(), "src_ip");
        assert_eq!(MatchKind::DstPort.wire_key(), "dst_port");
        assert_eq!(MatchKind::FwMark.wire_key(), "fw_mark");
    }

    #[test]
    fn test_port_helpers() {
        let m = Match::dst_port(443);
        assert_eq!(m.kind, MatchKind::DstPort);
        assert_eq!(m.value, "443");
    }
}
