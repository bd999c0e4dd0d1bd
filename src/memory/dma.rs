//! Huge-page-backed (or anonymous) physically-contiguous memory allocation.
//!
//! A single allocation backend: plain `mmap` over either an anonymous mapping
//! or a `hugetlbfs` file, matching the framework's no-kernel-module,
//! no-IOMMU scope.

use std::ffi::c_void;
use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::process;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::error::{Error, Result};
use crate::memory::pagemap::virt_to_phys;
use crate::platform;

static ALLOCATION_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// An owned, physically-backed range of virtual memory.
///
/// Created by [`allocate`]; released by calling [`DmaRegion::free`] (or
/// dropping it, as a safety net — see the `Drop` impl below).
pub struct DmaRegion {
    virt: *mut u8,
    phys: u64,
    size: usize,
    huge: bool,
    freed: bool,
}

// The region is exclusively owned by whichever pool or caller holds it; it is
// safe to move across threads as long as that exclusivity is upheld by the
// caller (the framework as a whole does not synchronize cross-thread use).
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Virtual base address of the region.
    pub fn virt_addr(&self) -> *mut u8 {
        self.virt
    }

    /// Physical (bus) base address of the region.
    pub fn phys_addr(&self) -> u64 {
        self.phys
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Releases the region back to the kernel. Idempotent: calling this more
    /// than once is a no-op after the first call.
    pub fn free(&mut self) {
        if self.freed {
            return;
        }
        free_raw(self.virt, self.size, self.huge);
        self.freed = true;
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        self.free();
    }
}

/// Allocates `size` bytes of DMA-capable memory.
///
/// When `huge` is `true`, the region is backed by one or more hugetlbfs
/// pages. When `contiguous` is also `true`, the allocation is refused with
/// [`Error::SizeTooLarge`] if `size` exceeds a single huge page; otherwise a
/// single huge page backs the (necessarily small) allocation. When `huge` is
/// `false`, an anonymous, page-aligned mapping of exactly `size` bytes is
/// used (never physically contiguous beyond one page).
pub fn allocate(size: usize, huge: bool, contiguous: bool) -> Result<DmaRegion> {
    if size == 0 {
        return Err(Error::InvalidArgument("size must be greater than zero".into()));
    }

    if huge {
        allocate_huge(size, contiguous)
    } else {
        allocate_anonymous(size)
    }
}

#[cfg(target_os = "linux")]
fn allocate_huge(size: usize, contiguous: bool) -> Result<DmaRegion> {
    let huge_page_size = platform::huge_page_size();
    if huge_page_size <= 0 {
        return Err(Error::NotSupported("hugetlbfs is not mounted".into()));
    }
    let huge_page_size = huge_page_size as usize;

    if contiguous && size > huge_page_size {
        return Err(Error::SizeTooLarge);
    }

    let mapped_size = round_up(size, huge_page_size);

    let id = ALLOCATION_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = format!("{}/ixy-core-{}-{}", platform::HUGE_PAGE_MOUNT, process::id(), id);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotSupported(format!(
                    "hugepage directory {} missing - are hugepages enabled and mounted?",
                    platform::HUGE_PAGE_MOUNT
                ))
            } else {
                Error::OsError(e)
            }
        })?;

    file.set_len(mapped_size as u64).map_err(Error::OsError)?;

    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            mapped_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_HUGETLB,
            file.as_raw_fd(),
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        let err = std::io::Error::last_os_error();
        let _ = fs::remove_file(&path);
        return Err(Error::OsError(err));
    }

    if unsafe { libc::mlock(ptr, mapped_size) } != 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::munmap(ptr, mapped_size) };
        let _ = fs::remove_file(&path);
        return Err(Error::OsError(err));
    }

    // The mapping keeps the pages alive once it exists; the name and the fd
    // serve no further purpose, so both are dropped immediately.
    drop(file);
    let _ = fs::remove_file(&path);

    let virt = ptr as *mut u8;
    let phys = virt_to_phys(virt as usize);
    if phys == 0 {
        unsafe { libc::munmap(ptr, mapped_size) };
        return Err(Error::InvalidAddress(
            "virt_to_phys returned 0 for a freshly mapped huge page".into(),
        ));
    }

    debug!(
        "mapped {} huge-page byte(s) at {:p} (phys 0x{:x})",
        mapped_size, virt, phys
    );

    Ok(DmaRegion {
        virt,
        phys,
        size: mapped_size,
        huge: true,
        freed: false,
    })
}

#[cfg(not(target_os = "linux"))]
fn allocate_huge(_size: usize, _contiguous: bool) -> Result<DmaRegion> {
    Err(Error::NotSupported("huge-page allocation requires Linux".into()))
}

fn allocate_anonymous(size: usize) -> Result<DmaRegion> {
    let page_size = platform::page_size();
    let mapped_size = round_up(size, page_size);

    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            mapped_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(Error::OsError(std::io::Error::last_os_error()));
    }

    let virt = ptr as *mut u8;
    let phys = virt_to_phys(virt as usize);

    debug!("mapped {} anonymous byte(s) at {:p}", mapped_size, virt);

    Ok(DmaRegion {
        virt,
        phys,
        size: mapped_size,
        huge: false,
        freed: false,
    })
}

fn free_raw(virt: *mut u8, size: usize, huge: bool) {
    if virt.is_null() {
        return;
    }
    unsafe {
        libc::munmap(virt as *mut c_void, size);
    }
    // huge-page allocations already unlinked their backing file inside
    // allocate(); the mapping itself carries no filesystem path to clean up
    // here, so munmap alone is sufficient for both backends.
    let _ = huge;
}

fn round_up(size: usize, align: usize) -> usize {
    if size % align == 0 {
        size
    } else {
        ((size / align) + 1) * align
    }
}
