//! Value objects shared across the crate.
//!
//! These parse and normalize identifiers and units at the edge so the
//! domain never sees a malformed handle, device name, bandwidth, or
//! priority.

pub mod bandwidth;
pub mod device;
pub mod handle;
pub mod priority;

pub use bandwidth::{Bandwidth, BandwidthUnit};
pub use device::DeviceName;
pub use handle::Handle;
pub use priority::Priority;
