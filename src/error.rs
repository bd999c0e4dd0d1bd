use std::io;

/// Error taxonomy shared by every fallible operation in the crate.
///
/// Variants correspond to the error kinds in the framework's error handling
/// design: each is surfaced verbatim to the caller, never silently retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Null, blank, or out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A physical or virtual address was zero where it must not be, or
    /// address translation failed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A `contiguous = true` allocation requested more than one huge page.
    #[error("requested size exceeds one huge page")]
    SizeTooLarge,

    /// All memory-pool identifiers are in use, or a huge-page quota was hit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Wraps the underlying OS error; the message is preserved verbatim so
    /// callers can pattern-match on substrings like "No such device".
    #[error("{0}")]
    OsError(#[from] io::Error),

    /// The operation is unavailable on this host (e.g. huge pages or
    /// `/proc/self/pagemap` on a non-Linux target).
    #[error("not supported on this platform: {0}")]
    NotSupported(String),

    /// Any operation on a `PciDevice` after `close()`.
    #[error("device already closed")]
    AlreadyClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
