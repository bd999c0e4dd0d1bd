//! Process-wide identifier registry mapping a pool id back to its
//! [`MemoryPool`](super::pool::MemoryPool). Touched only during pool
//! setup/teardown; the hot rx/tx path never reads or writes it.

use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::memory::pool::MemoryPool;

struct Registry {
    pools: BTreeMap<u32, Weak<MemoryPool>>,
    reversed: bool,
}

impl Registry {
    const fn new() -> Self {
        Registry {
            pools: BTreeMap::new(),
            reversed: false,
        }
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());
}

/// Pure identifier-allocation policy, factored out for testability: start at
/// 0 and increment; on 32-bit overflow switch to decrementing from the
/// minimum existing identifier; fail when both ends collide.
pub(crate) fn next_id(existing: &BTreeMap<u32, Weak<MemoryPool>>, reversed: &mut bool) -> Result<u32> {
    if existing.is_empty() {
        return Ok(0);
    }

    if !*reversed {
        let max_existing = *existing.keys().next_back().unwrap();
        if let Some(id) = max_existing.checked_add(1) {
            return Ok(id);
        }
        *reversed = true;
    }

    let min_existing = *existing.keys().next().unwrap();
    min_existing
        .checked_sub(1)
        .ok_or_else(|| Error::ResourceExhausted("all 2^32 memory-pool identifiers are in use".into()))
}

/// Assigns a fresh identifier to `pool` and registers it process-wide.
pub(crate) fn register(pool: &Rc<MemoryPool>) -> Result<u32> {
    let mut registry = REGISTRY.lock().unwrap();
    let id = next_id(&registry.pools, &mut registry.reversed)?;
    registry.pools.insert(id, Rc::downgrade(pool));
    Ok(id)
}

/// Removes `pool`'s identifier from the registry, but only if the entry
/// still refers to this exact pool (it may have already been replaced or
/// removed).
pub(crate) fn deregister(id: u32, pool: &Rc<MemoryPool>) {
    let mut registry = REGISTRY.lock().unwrap();
    if let Some(weak) = registry.pools.get(&id) {
        if let Some(registered) = weak.upgrade() {
            if Rc::ptr_eq(&registered, pool) {
                registry.pools.remove(&id);
            }
        } else {
            // Dead entry left by a pool that was dropped without
            // deregistering; safe to clean up opportunistically.
            registry.pools.remove(&id);
        }
    }
}

/// Looks up a registered pool by identifier.
pub fn find(id: u32) -> Option<Rc<MemoryPool>> {
    let registry = REGISTRY.lock().unwrap();
    registry.pools.get(&id).and_then(Weak::upgrade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_id_is_zero() {
        let existing = BTreeMap::new();
        let mut reversed = false;
        assert_eq!(next_id(&existing, &mut reversed).unwrap(), 0);
    }

    #[test]
    fn ascending_allocation_increments() {
        let mut existing = BTreeMap::new();
        existing.insert(5u32, Weak::new());
        let mut reversed = false;
        assert_eq!(next_id(&existing, &mut reversed).unwrap(), 6);
        assert!(!reversed);
    }

    #[test]
    fn overflow_flips_to_reversed_and_decrements_from_the_minimum() {
        let mut existing = BTreeMap::new();
        existing.insert(0u32, Weak::new());
        existing.insert(u32::MAX, Weak::new());
        let mut reversed = false;
        assert_eq!(next_id(&existing, &mut reversed).unwrap(), u32::MAX - 1);
        assert!(reversed);
    }

    #[test]
    fn both_ends_colliding_is_exhausted() {
        let mut existing = BTreeMap::new();
        existing.insert(0u32, Weak::new());
        let mut reversed = true;
        assert!(matches!(
            next_id(&existing, &mut reversed),
            Err(Error::ResourceExhausted(_))
        ));
    }
}
