//! Preallocated pool of fixed-size packet buffers carved out of one DMA
//! region, with a LIFO free-list and bulk get/put. Pools are owned by the
//! single thread polling the ring(s) they feed — see the framework's
//! concurrency model for why there is no internal synchronization here.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::buffer::{PacketBuffer, HEADER_SIZE};
use crate::memory::dma::{self, DmaRegion};
use crate::memory::registry;

/// Packets need at least the 64-byte prefix plus room for an Ethernet MTU.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE;

/// A contiguous DMA region carved into `capacity` buffers of `packet_size`
/// bytes each, with a LIFO free-list and a process-wide identifier once
/// registered.
pub struct MemoryPool {
    region: DmaRegion,
    capacity: usize,
    packet_size: usize,
    free_list: RefCell<Vec<PacketBuffer>>,
    id: Cell<Option<u32>>,
}

impl MemoryPool {
    /// Allocates `capacity * packet_size` bytes of huge-page-backed DMA
    /// memory, carves it into `capacity` buffers, resolves each buffer's
    /// physical address, and pushes all of them onto the free-list.
    pub fn new(capacity: usize, packet_size: usize) -> Result<Rc<MemoryPool>> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be greater than zero".into()));
        }
        if packet_size < MIN_PACKET_SIZE {
            return Err(Error::InvalidArgument(format!(
                "packet_size must be at least {MIN_PACKET_SIZE}"
            )));
        }

        let total_size = capacity
            .checked_mul(packet_size)
            .ok_or_else(|| Error::InvalidArgument("capacity * packet_size overflows".into()))?;

        let region = dma::allocate(total_size, true, false)?;
        let base = region.virt_addr();

        let mut free_list = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let virt = unsafe { base.add(i * packet_size) };
            let buffer = unsafe { PacketBuffer::from_raw(virt) };

            let phys = crate::memory::pagemap::virt_to_phys(virt as usize);
            if phys == 0 {
                return Err(Error::InvalidAddress(format!(
                    "virt_to_phys failed for buffer {i} of a freshly allocated pool"
                )));
            }

            unsafe {
                buffer.set_phys_addr(phys);
                buffer.set_pool_base(base as usize);
            }
            buffer.set_size(0);

            free_list.push(buffer);
        }

        debug!("memory pool constructed: {capacity} buffers of {packet_size} bytes each");

        Ok(Rc::new(MemoryPool {
            region,
            capacity,
            packet_size,
            free_list: RefCell::new(free_list),
            id: Cell::new(None),
        }))
    }

    /// Number of buffers this pool was constructed with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of each buffer, header included.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Current free-list length.
    pub fn size(&self) -> usize {
        self.free_list.borrow().len()
    }

    /// This pool's identifier, if registered.
    pub fn id(&self) -> Option<u32> {
        self.id.get()
    }

    /// Pops one buffer off the free-list, or `None` if it is empty.
    pub fn get(&self) -> Option<PacketBuffer> {
        self.free_list.borrow_mut().pop()
    }

    /// Pops up to `min(n, dst.len() - offset, size())` buffers into
    /// `dst[offset..offset + k]`, returning `k`.
    pub fn get_bulk(&self, dst: &mut [PacketBuffer], offset: usize, n: usize) -> usize {
        let mut free_list = self.free_list.borrow_mut();
        let k = n.min(dst.len().saturating_sub(offset)).min(free_list.len());
        for slot in dst.iter_mut().skip(offset).take(k) {
            *slot = free_list.pop().expect("k is bounded by free_list.len()");
        }
        k
    }

    /// Pushes one buffer back onto the free-list. If the pool is already at
    /// capacity, the buffer is dropped silently — this only happens on
    /// programmer error (e.g. a double-free) and is not fatal.
    pub fn free(&self, buffer: PacketBuffer) {
        let mut free_list = self.free_list.borrow_mut();
        if free_list.len() >= self.capacity {
            warn!("dropping a buffer freed into an already-full pool (id {:?})", self.id.get());
            return;
        }
        free_list.push(buffer);
    }

    /// Pushes up to `min(n, src.len() - offset, capacity - size())` buffers
    /// from `src[offset..]` back onto the free-list, returning the count
    /// consumed. Each consumed slot is set to [`PacketBuffer::empty`] to
    /// prevent a later accidental double-free.
    pub fn free_bulk(&self, src: &mut [PacketBuffer], offset: usize, n: usize) -> usize {
        let mut free_list = self.free_list.borrow_mut();
        let room = self.capacity - free_list.len();
        let k = n.min(src.len().saturating_sub(offset)).min(room);
        for slot in src.iter_mut().skip(offset).take(k) {
            free_list.push(*slot);
            *slot = PacketBuffer::empty();
        }
        k
    }

    /// Assigns a fresh identifier from the global registry and records it.
    pub fn register(self: &Rc<Self>) -> Result<u32> {
        let id = registry::register(self)?;
        self.id.set(Some(id));

        let free_list = self.free_list.borrow();
        for buffer in free_list.iter() {
            unsafe { buffer.set_pool_id(id) };
        }
        drop(free_list);

        debug!("registered memory pool with id {id}");
        Ok(id)
    }

    /// Removes this pool's id from the global registry, if it still points
    /// at this pool.
    pub fn deregister(self: &Rc<Self>) {
        if let Some(id) = self.id.get() {
            registry::deregister(id, self);
            self.id.set(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> Rc<MemoryPool> {
        MemoryPool::new(32, 2048).expect("pool allocation should succeed in tests")
    }

    #[test]
    fn pool_starts_full() {
        let pool = small_pool();
        assert_eq!(pool.size(), pool.capacity());
    }

    #[test]
    fn every_buffer_has_a_nonzero_physical_address() {
        let pool = small_pool();
        let mut seen = Vec::new();
        while let Some(buf) = pool.get() {
            assert_ne!(buf.phys_addr(), 0);
            seen.push(buf);
        }
        assert_eq!(seen.len(), pool.capacity());
    }

    #[test]
    fn get_free_round_trip_conserves_the_pool() {
        let pool = small_pool();
        let mut taken = Vec::new();
        let k = {
            let mut buf = [PacketBuffer::empty(); 10];
            let k = pool.get_bulk(&mut buf, 0, 10);
            taken.extend_from_slice(&buf[..k]);
            k
        };
        assert_eq!(k, 10);
        assert_eq!(pool.size(), pool.capacity() - 10);

        let mut addrs: Vec<*mut u8> = taken.iter().map(|b| b.virt_addr()).collect();
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), 10, "no buffer address should repeat");

        let returned = pool.free_bulk(&mut taken, 0, 10);
        assert_eq!(returned, 10);
        assert_eq!(pool.size(), pool.capacity());
        assert!(taken.iter().all(|b| !b.is_valid()));
    }

    #[test]
    fn freeing_into_a_full_pool_is_dropped_silently() {
        let pool = small_pool();
        let spare = unsafe { PacketBuffer::from_raw(pool.region.virt_addr()) };
        pool.free(spare);
        assert_eq!(pool.size(), pool.capacity());
    }

    #[test]
    fn register_assigns_an_id_and_stamps_every_buffer() {
        let pool = small_pool();
        let id = pool.register().expect("register should succeed");
        assert_eq!(pool.id(), Some(id));

        let buf = pool.get().unwrap();
        assert_eq!(buf.pool_id(), id);

        pool.deregister();
        assert_eq!(pool.id(), None);
    }

    #[test]
    fn find_resolves_a_registered_pool_by_id() {
        let pool = small_pool();
        let id = pool.register().unwrap();
        let found = registry::find(id).expect("pool should be findable by id");
        assert!(Rc::ptr_eq(&found, &pool));
        pool.deregister();
        assert!(registry::find(id).is_none());
    }
}
