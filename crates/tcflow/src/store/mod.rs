//! Storage contracts and their in-memory reference implementations.
//!
//! Every store trait is pluggable; a durable backend implements the same
//! contract. The in-memory implementations guard their state with a
//! read/write lock that admits concurrent readers and serializes
//! writers.

pub mod event_store;
pub mod read_model;
pub mod timeseries;

pub use event_store::{EventStore, MemoryEventStore};
pub use read_model::{MemoryReadModelStore, ReadModelStore};
pub use timeseries::{DataRange, Interval, MemoryTimeSeriesStore, StorageStats, TimeSeriesStore};
