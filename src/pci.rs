//! Sysfs-driven PCI config-space access, driver (un)binding, and BAR0 mapping.
//!
//! Every operation here is a blocking filesystem call; none of it runs on the
//! steady-state rx/tx path (see the framework's concurrency model).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::ptr;

use log::{debug, warn};

use crate::error::{Error, Result};

const VENDOR_ID_OFFSET: u64 = 0x00;
const DEVICE_ID_OFFSET: u64 = 0x02;
const COMMAND_OFFSET: u64 = 0x04;
const CLASS_ID_OFFSET: u64 = 0x0B;
const BAR0_OFFSET: u64 = 0x10;

const COMMAND_BUS_MASTER_BIT: u16 = 1 << 2;

fn sysfs_device_dir(address: &str) -> String {
    format!("/sys/bus/pci/devices/{address}")
}

fn sysfs_driver_dir(driver: &str) -> String {
    format!("/sys/bus/pci/drivers/{driver}")
}

/// Validates the PCI address format `DDDD:BB:DD.F` without pulling in a
/// regex engine for one fixed-width pattern.
fn validate_address(address: &str) -> Result<()> {
    let invalid = || Error::InvalidArgument(format!("'{address}' is not a valid PCI address"));

    let bytes = address.as_bytes();
    // DDDD:BB:DD.F -> 4 + 1 + 2 + 1 + 2 + 1 + 1 = 12 bytes
    if bytes.len() != 12 {
        return Err(invalid());
    }
    let digit_ranges: [(usize, usize); 4] = [(0, 4), (5, 7), (8, 10), (11, 12)];
    let separators = [(4, b':'), (7, b':'), (10, b'.')];

    for (start, end) in digit_ranges {
        if !address[start..end].bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
    }
    for (pos, expected) in separators {
        if bytes[pos] != expected {
            return Err(invalid());
        }
    }
    Ok(())
}

/// A mapped memory region over a device's BAR0.
pub struct Bar0Mapping {
    addr: *mut u8,
    len: usize,
}

impl Bar0Mapping {
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Bar0Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr as *mut libc::c_void, self.len);
        }
    }
}

// The mapping is exclusively owned by whoever holds the PciDevice; safe to
// move across threads under the same single-owner discipline as DmaRegion.
unsafe impl Send for Bar0Mapping {}

/// A handle bound to one PCI device and the kernel driver name used for
/// bind/unbind.
pub struct PciDevice {
    address: String,
    driver: String,
    config: Option<File>,
    resource0: Option<File>,
    bind_file: Option<File>,
    unbind_file: Option<File>,
}

impl PciDevice {
    /// Opens config space, resource0, and the driver's bind/unbind files for
    /// `address` (format `DDDD:BB:DD.F`).
    pub fn open(address: &str, driver: &str) -> Result<PciDevice> {
        validate_address(address)?;
        if driver.is_empty() {
            return Err(Error::InvalidArgument("driver name must not be empty".into()));
        }

        let device_dir = sysfs_device_dir(address);
        let driver_dir = sysfs_driver_dir(driver);

        let config = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("{device_dir}/config"))?;
        let resource0 = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("{device_dir}/resource0"))?;
        let bind_file = OpenOptions::new().write(true).open(format!("{driver_dir}/bind"))?;
        let unbind_file = OpenOptions::new().write(true).open(format!("{driver_dir}/unbind"))?;

        debug!("opened PCI device {address} for driver {driver}");

        Ok(PciDevice {
            address: address.to_string(),
            driver: driver.to_string(),
            config: Some(config),
            resource0: Some(resource0),
            bind_file: Some(bind_file),
            unbind_file: Some(unbind_file),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn config_mut(&mut self) -> Result<&mut File> {
        self.config.as_mut().ok_or(Error::AlreadyClosed)
    }

    /// Reads `buf.len()` bytes from config space starting at `offset`,
    /// seeking first. A short read is logged, not treated as a hard error —
    /// the fields this framework reads all fit within the first 64 bytes of
    /// config space, which are guaranteed to be mapped.
    fn read_config(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = self.config_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        let n = file.read(buf)?;
        if n < buf.len() {
            warn!("short read of {n}/{} byte(s) from PCI config space at offset 0x{offset:x}", buf.len());
        }
        Ok(())
    }

    /// Writes `buf` to config space at `offset` using `pwrite` semantics, so
    /// the write does not disturb the handle's seek position (used by the
    /// next `read_config` call).
    fn write_config(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let file = self.config_mut()?;
        let fd = file.as_raw_fd();
        let ret = unsafe { libc::pwrite(fd, buf.as_ptr() as *const libc::c_void, buf.len(), offset as libc::off_t) };
        if ret < 0 || ret as usize != buf.len() {
            return Err(Error::OsError(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn vendor_id(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_config(VENDOR_ID_OFFSET, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn device_id(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_config(DEVICE_ID_OFFSET, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// High byte of the 3-byte class code (network controller == `0x02`).
    pub fn class_id(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_config(CLASS_ID_OFFSET, &mut buf)?;
        Ok(buf[0])
    }

    fn command_register(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_config(COMMAND_OFFSET, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn is_dma_enabled(&mut self) -> Result<bool> {
        Ok(self.command_register()? & COMMAND_BUS_MASTER_BIT != 0)
    }

    pub fn enable_dma(&mut self) -> Result<()> {
        let cmd = self.command_register()? | COMMAND_BUS_MASTER_BIT;
        self.write_config(COMMAND_OFFSET, &cmd.to_le_bytes())
    }

    pub fn disable_dma(&mut self) -> Result<()> {
        let cmd = self.command_register()? & !COMMAND_BUS_MASTER_BIT;
        self.write_config(COMMAND_OFFSET, &cmd.to_le_bytes())
    }

    /// Whether BAR0 is a memory BAR (as opposed to an I/O BAR), i.e. whether
    /// it can be `mmap`'d at all.
    pub fn is_mappable(&mut self) -> Result<bool> {
        let mut buf = [0u8; 4];
        self.read_config(BAR0_OFFSET, &mut buf)?;
        let bar0 = u32::from_le_bytes(buf);
        Ok(bar0 & 1 == 0)
    }

    /// Writes this device's address to the driver's `bind` file.
    ///
    /// Binding an already-bound device surfaces the kernel's `ENODEV`
    /// ("No such device") verbatim; callers typically tolerate this.
    pub fn bind(&mut self) -> Result<()> {
        let address = self.address.clone();
        let file = self.bind_file.as_mut().ok_or(Error::AlreadyClosed)?;
        file.write_all(address.as_bytes())?;
        debug!("bound {address} to driver {}", self.driver);
        Ok(())
    }

    /// Writes this device's address to the driver's `unbind` file.
    ///
    /// Unbinding an already-unbound device surfaces `ENODEV` verbatim;
    /// callers typically tolerate a double-unbind during setup.
    pub fn unbind(&mut self) -> Result<()> {
        let address = self.address.clone();
        let file = self.unbind_file.as_mut().ok_or(Error::AlreadyClosed)?;
        file.write_all(address.as_bytes())?;
        debug!("unbound {address} from driver {}", self.driver);
        Ok(())
    }

    /// Maps BAR0 (`resource0`) for direct register access.
    ///
    /// Uses the handle opened at [`PciDevice::open`] when it is still open;
    /// after `close()`, this is the one operation that keeps working — it
    /// opens a fresh handle to `resource0` just for the mapping, since `mmap`
    /// only needs the fd for the duration of the call (the kernel mapping
    /// outlives it).
    pub fn map(&mut self) -> Result<Bar0Mapping> {
        match &self.resource0 {
            Some(file) => self.map_fd(file.as_raw_fd(), file.metadata()?.len() as usize),
            None => {
                let device_dir = sysfs_device_dir(&self.address);
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(format!("{device_dir}/resource0"))?;
                let len = file.metadata()?.len() as usize;
                self.map_fd(file.as_raw_fd(), len)
            }
        }
    }

    fn map_fd(&self, fd: i32, len: usize) -> Result<Bar0Mapping> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::OsError(std::io::Error::last_os_error()));
        }

        debug!("mapped BAR0 of {} ({len} byte(s))", self.address);

        Ok(Bar0Mapping { addr: ptr as *mut u8, len })
    }

    /// Releases all open handles. Every subsequent operation except `map`
    /// (which opens a fresh handle) fails with [`Error::AlreadyClosed`].
    /// Calling `close` again is a no-op, not an error.
    pub fn close(&mut self) {
        self.config = None;
        self.resource0 = None;
        self.bind_file = None;
        self.unbind_file = None;
    }
}
