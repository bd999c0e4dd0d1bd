//! Host facts the rest of the crate treats as build/runtime constants: page
//! size, pointer width, and the hugetlbfs page size. All three are cheap to
//! recompute but are cached after the first call since they never change for
//! the lifetime of the process.

use std::fs;
use std::mem;
use std::sync::Mutex;

use lazy_static::lazy_static;

/// Mount point hugetlbfs is expected at. A build-time constant, per the
/// framework's process-state assumptions.
pub const HUGE_PAGE_MOUNT: &str = "/mnt/huge";

lazy_static! {
    static ref HUGE_PAGE_SIZE_CACHE: Mutex<Option<i64>> = Mutex::new(None);
    static ref PAGE_SIZE_CACHE: Mutex<Option<usize>> = Mutex::new(None);
}

/// Returns the platform page size, as reported by `sysconf(_SC_PAGESIZE)`.
/// Cached after the first call since it cannot change for the lifetime of
/// the process.
pub fn page_size() -> usize {
    let mut cache = PAGE_SIZE_CACHE.lock().unwrap();
    if let Some(size) = *cache {
        return size;
    }

    let size = page_size_uncached();
    *cache = Some(size);
    size
}

fn page_size_uncached() -> usize {
    #[cfg(unix)]
    {
        let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if ret > 0 {
            return ret as usize;
        }
    }
    4096
}

/// Returns the pointer width of this build: 4 on 32-bit targets, 8 on 64-bit.
pub const fn pointer_width() -> usize {
    mem::size_of::<usize>()
}

/// Discovers the hugetlbfs page size in bytes.
///
/// Scans `/etc/mtab` for a `hugetlbfs <mount> hugetlbfs ...` line whose mount
/// point matches [`HUGE_PAGE_MOUNT`], then parses the `Hugepagesize: <n> <unit>`
/// line of `/proc/meminfo`. Returns `-1` if hugetlbfs is not mounted or the
/// files are unreadable, `0` if the unit is unrecognized, and a positive size
/// (in bytes) otherwise. The result is cached after the first call.
pub fn huge_page_size() -> i64 {
    let mut cache = HUGE_PAGE_SIZE_CACHE.lock().unwrap();
    if let Some(size) = *cache {
        return size;
    }

    let size = huge_page_size_uncached();
    *cache = Some(size);
    size
}

#[cfg(target_os = "linux")]
fn huge_page_size_uncached() -> i64 {
    let mtab = match fs::read_to_string("/etc/mtab") {
        Ok(contents) => contents,
        Err(_) => return -1,
    };

    let mounted = mtab.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let fs_spec = fields.next();
        let mount_point = fields.next();
        let fs_type = fields.next();
        fs_spec == Some("hugetlbfs") && fs_type == Some("hugetlbfs") && mount_point == Some(HUGE_PAGE_MOUNT)
    });

    if !mounted {
        return -1;
    }

    let meminfo = match fs::read_to_string("/proc/meminfo") {
        Ok(contents) => contents,
        Err(_) => return -1,
    };

    let line = match meminfo.lines().find(|l| l.starts_with("Hugepagesize:")) {
        Some(l) => l,
        None => return -1,
    };

    let mut fields = line.trim_start_matches("Hugepagesize:").split_whitespace();
    let amount: i64 = match fields.next().and_then(|s| s.parse().ok()) {
        Some(n) => n,
        None => return -1,
    };
    let unit = fields.next().unwrap_or("");

    let multiplier: i64 = match unit {
        "B" => 1,
        "kB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return 0,
    };

    amount * multiplier
}

#[cfg(not(target_os = "linux"))]
fn huge_page_size_uncached() -> i64 {
    -1
}
