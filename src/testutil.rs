//! Test-harness plumbing: resolves which real NICs (if any) are available to
//! integration tests via the `IXY_<DRIVER>_COUNT` / `IXY_<DRIVER>_ADDR_<i>`
//! environment variables, so hardware-dependent tests can skip themselves
//! cleanly instead of failing in an environment with no bound NICs.

use std::env;

/// Reads the PCI addresses configured for `driver` (e.g. `"IXGBE"`) via
/// `IXY_<DRIVER>_COUNT` and `IXY_<DRIVER>_ADDR_<i>` (`i` from 1 to count).
/// Returns an empty vector if the count variable is absent, unparsable, or
/// zero.
pub fn configured_addresses(driver: &str) -> Vec<String> {
    let count_var = format!("IXY_{}_COUNT", driver.to_uppercase());
    let count: usize = match env::var(&count_var).ok().and_then(|s| s.parse().ok()) {
        Some(n) => n,
        None => return Vec::new(),
    };

    (1..=count)
        .filter_map(|i| env::var(format!("IXY_{}_ADDR_{}", driver.to_uppercase(), i)).ok())
        .collect()
}

/// Convenience for integration tests: returns `true` and logs a skip reason
/// when no NIC of `driver` is configured in this environment.
pub fn skip_without_hardware(driver: &str) -> bool {
    let addrs = configured_addresses(driver);
    if addrs.is_empty() {
        log::info!("skipping: no {driver} NICs configured (set IXY_{}_COUNT)", driver.to_uppercase());
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't race against each other under a parallel test
    // runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn no_count_variable_means_no_addresses() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("IXY_TESTDRIVER_COUNT");
        assert!(configured_addresses("testdriver").is_empty());
    }

    #[test]
    fn reads_the_configured_number_of_addresses() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("IXY_TESTDRIVER_COUNT", "2");
        env::set_var("IXY_TESTDRIVER_ADDR_1", "0000:03:00.0");
        env::set_var("IXY_TESTDRIVER_ADDR_2", "0000:03:00.1");

        let addrs = configured_addresses("testdriver");
        assert_eq!(addrs, vec!["0000:03:00.0", "0000:03:00.1"]);

        env::remove_var("IXY_TESTDRIVER_COUNT");
        env::remove_var("IXY_TESTDRIVER_ADDR_1");
        env::remove_var("IXY_TESTDRIVER_ADDR_2");
    }
}
