//! Event-sourced traffic control for Linux interfaces.
//!
//! This crate sits between a declarative bandwidth policy ("web
//! traffic: 2 Mb/s guaranteed, burst to 5 Mb/s, priority 1, ports
//! 80/443") and the kernel's hierarchical packet scheduler. Every
//! change is decided by a per-interface aggregate, persisted as an
//! event, applied through a kernel adapter, and fanned out to
//! projections that maintain read models and a statistics time series.
//!
//! # Architecture
//!
//! ```text
//! Policy ──► Translator ──► Commands ──► Command Bus ──► Handler
//!                                                          │
//!                                                          ├─► Aggregate.decide ──► Events
//!                                                          ├─► EventStore.append (version-checked)
//!                                                          ├─► KernelAdapter.apply
//!                                                          └─► Event Bus ──► Projections
//!                                                                              ├─► Read models
//!                                                                              └─► Time series
//! Query ──► Query Bus ──► Handler ──► (read model │ replayed aggregate │ live counters)
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tcflow::kernel::MemoryAdapter;
//! use tcflow::policy::{TrafficClass, TrafficPolicy};
//! use tcflow::TrafficController;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tcflow::Result<()> {
//! let controller = TrafficController::new(Arc::new(MemoryAdapter::new()));
//!
//! let policy = TrafficPolicy::new("eth0")?
//!     .total_bandwidth("100mbit")?
//!     .class(
//!         TrafficClass::new("web")
//!             .guaranteed("30mbit")?
//!             .burstable_to("60mbit")?
//!             .priority(1)
//!             .http()
//!             .https(),
//!     )
//!     .class(
//!         TrafficClass::new("ssh")
//!             .guaranteed("10mbit")?
//!             .burstable_to("20mbit")?
//!             .priority(0)
//!             .ssh(),
//!     );
//!
//! controller.apply_policy(&policy).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Multi-threaded callers are expected. Shared stores use read/write
//! locks (concurrent readers, serialized writers); per-interface write
//! serialization comes from the event store's expected-version check,
//! with one automatic retry on conflict. Any pending operation is
//! cancelled by dropping its future; writes already committed to a
//! store stay committed.

pub mod bus;
pub mod command;
pub mod controller;
pub mod domain;
pub mod error;
pub mod event;
pub mod kernel;
pub mod policy;
pub mod projection;
pub mod query;
pub mod stats;
pub mod store;
pub mod types;

// Re-export the types most callers touch.
pub use controller::TrafficController;
pub use error::{Error, Result};
pub use event::{EventRecord, TcEvent};
pub use policy::{TrafficClass, TrafficPolicy};
pub use types::{Bandwidth, DeviceName, Handle, Priority};
