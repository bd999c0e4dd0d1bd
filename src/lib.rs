//! Userspace driver framework core.
//!
//! Supplies the infrastructure a polling-mode NIC driver needs to bypass the
//! kernel network stack: raw PCI configuration-space and BAR0 access
//! ([`pci`]), huge-page-backed DMA memory with virtual-to-physical
//! translation ([`memory::dma`], [`memory::pagemap`]), and a preallocated
//! pool of fixed-layout packet buffers shared with NIC descriptor rings
//! ([`memory::pool`], [`memory::buffer`]).
//!
//! NIC-family register programming (ixgbe, VirtIO), the bidirectional
//! forwarder loop, and command-line wiring are out of scope; [`device`]
//! exposes only the contract a concrete driver implements.

pub mod device;
pub mod error;
pub mod memory;
pub mod pci;
pub mod platform;

/// Test-harness plumbing (`IXY_<DRIVER>_COUNT` / `IXY_<DRIVER>_ADDR_<i>`
/// resolution). Not part of the framework's production surface: only built
/// under `#[cfg(test)]` or when a downstream crate enables the `test-util`
/// feature, which `[dev-dependencies]` does for this crate's own integration
/// tests below.
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use error::{Error, Result};
