//! PCI device scenarios. All of these require a real device bound to a real
//! driver and are skipped when the test harness has no NIC configured via
//! the `IXY_<DRIVER>_COUNT` / `IXY_<DRIVER>_ADDR_<i>` environment variables.

use ixy_core::pci::PciDevice;
use ixy_core::testutil;

fn first_configured_address(driver: &str) -> Option<String> {
    testutil::configured_addresses(driver).into_iter().next()
}

/// Scenario S2: enabling then disabling DMA is observable through
/// `is_dma_enabled`.
#[test]
fn s2_dma_enable_round_trip() {
    let Some(address) = first_configured_address("ixgbe") else {
        eprintln!("skipping s2_dma_enable_round_trip: no ixgbe NIC configured");
        return;
    };

    let mut device = PciDevice::open(&address, "ixgbe").expect("should open a configured device");
    device.enable_dma().expect("enable_dma should succeed");
    assert!(device.is_dma_enabled().unwrap());
    device.disable_dma().expect("disable_dma should succeed");
    assert!(!device.is_dma_enabled().unwrap());
}

/// Scenario S5: after close(), every operation fails with AlreadyClosed, and
/// a second close() is a no-op.
#[test]
fn s5_close_invalidates_subsequent_operations() {
    let Some(address) = first_configured_address("ixgbe") else {
        eprintln!("skipping s5_close_invalidates_subsequent_operations: no ixgbe NIC configured");
        return;
    };

    let mut device = PciDevice::open(&address, "ixgbe").expect("should open a configured device");
    device.close();

    assert!(matches!(device.vendor_id(), Err(ixy_core::Error::AlreadyClosed)));
    assert!(matches!(device.bind(), Err(ixy_core::Error::AlreadyClosed)));
    assert!(matches!(device.unbind(), Err(ixy_core::Error::AlreadyClosed)));

    // Closing twice is not an error.
    device.close();
}

/// Property 5 (PCI config parity): class_id reports a network controller,
/// and is_mappable agrees with BAR0's memory-vs-I/O bit.
#[test]
fn pci_config_parity_for_a_network_controller() {
    let Some(address) = first_configured_address("ixgbe") else {
        eprintln!("skipping pci_config_parity_for_a_network_controller: no ixgbe NIC configured");
        return;
    };

    let mut device = PciDevice::open(&address, "ixgbe").expect("should open a configured device");
    assert_eq!(device.class_id().unwrap(), 0x02, "expected a network controller class code");
    let _ = device.is_mappable().unwrap();
}

/// Scenario S4: starting from a bound device, bind() fails with the kernel's
/// "No such device", unbind() succeeds, a second unbind() fails the same way,
/// and a final bind() succeeds again.
#[test]
fn s4_bind_unbind_sequence() {
    let Some(address) = first_configured_address("ixgbe") else {
        eprintln!("skipping s4_bind_unbind_sequence: no ixgbe NIC configured");
        return;
    };

    let mut device = PciDevice::open(&address, "ixgbe").expect("should open a configured device");

    match device.bind() {
        Err(ixy_core::Error::OsError(e)) => {
            assert_eq!(e.raw_os_error(), Some(libc::ENODEV), "expected ENODEV binding an already-bound device");
        }
        other => panic!("expected OsError(ENODEV) binding an already-bound device, got {other:?}"),
    }

    device.unbind().expect("unbind of a bound device should succeed");

    match device.unbind() {
        Err(ixy_core::Error::OsError(_)) => {}
        other => panic!("expected OsError on a second unbind, got {other:?}"),
    }

    device.bind().expect("re-bind after unbind should succeed");
}

#[test]
fn rejects_malformed_pci_addresses_before_touching_sysfs() {
    let result = PciDevice::open("not-an-address", "ixgbe");
    assert!(matches!(result, Err(ixy_core::Error::InvalidArgument(_))));
}
