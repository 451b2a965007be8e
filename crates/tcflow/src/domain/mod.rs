//! Domain entities and the traffic-control aggregate.

pub mod aggregate;
pub mod class;
pub mod filter;
pub mod qdisc;

pub use aggregate::TrafficControlAggregate;
pub use class::{Class, ClassKind, HtbClassParams};
pub use filter::{Filter, FilterProtocol, Match, MatchKind};
pub use qdisc::{FqCodelParams, Qdisc, QdiscKind};
