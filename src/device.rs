//! Per-NIC lifecycle contract. This crate defines only the trait and the
//! statistics counters every implementation shares; NIC-family register
//! programming (ixgbe, VirtIO, ...) is out of scope and lives in a separate
//! crate that implements [`DeviceBase`] atop [`crate::pci::PciDevice`] and
//! [`crate::memory::MemoryPool`].

use std::num::Wrapping;

use crate::error::Result;
use crate::memory::PacketBuffer;

/// Monotonic per-device packet/byte counters. Increment-only until an
/// explicit [`DeviceStats::reset`]; packet counters wrap modulo 2^32, byte
/// counters modulo 2^64.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceStats {
    pub rx_packets: Wrapping<u32>,
    pub tx_packets: Wrapping<u32>,
    pub rx_bytes: Wrapping<u64>,
    pub tx_bytes: Wrapping<u64>,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&mut self, bytes: u64) {
        self.rx_packets += Wrapping(1);
        self.rx_bytes += Wrapping(bytes);
    }

    pub fn record_tx(&mut self, bytes: u64) {
        self.tx_packets += Wrapping(1);
        self.tx_bytes += Wrapping(bytes);
    }

    /// Resets all four counters to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Link speed in megabits per second.
pub type LinkSpeedMbps = u32;

/// The contract every NIC-family driver built on this framework implements.
///
/// Concrete implementations (ixgbe, VirtIO) are out of scope for this crate;
/// it supplies the PCI device, memory pool, and packet buffer types they are
/// built from.
pub trait DeviceBase {
    /// Whether this device's vendor/device id is one this driver family
    /// recognizes.
    fn is_supported(&self) -> bool;

    /// Copies the current counters into `out`.
    fn read_stats(&self, out: &mut DeviceStats);

    /// Resets this device's counters to zero.
    fn reset_stats(&mut self);

    fn is_promiscuous(&self) -> Result<bool>;
    fn enable_promiscuous(&mut self) -> Result<()>;
    fn disable_promiscuous(&mut self) -> Result<()>;

    fn link_speed(&self) -> LinkSpeedMbps;

    /// Pulls up to `len` received packets into `buffers[offset..]`, returning
    /// the count actually produced. Descriptors freed by this call are
    /// replenished with fresh buffers from the device's pool. Returns `0`
    /// rather than erroring when there is no work, per the framework's
    /// steady-state error policy.
    fn rx_batch(&mut self, queue: u16, buffers: &mut [PacketBuffer], offset: usize, len: usize) -> usize;

    /// Publishes up to `len` packets from `buffers[offset..]` onto the
    /// transmit ring, returning the count actually accepted. Descriptors
    /// completed by the NIC since the last call are returned to the pool.
    fn tx_batch(&mut self, queue: u16, buffers: &mut [PacketBuffer], offset: usize, len: usize) -> usize;
}
