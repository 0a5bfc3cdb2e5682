//! Error type for pool operations.

use thiserror::Error;

/// Errors reported by the pool and its underlying allocator.
///
/// Freeing an untracked pointer is not an error: [`Pool::free_large`](crate::Pool::free_large)
/// reports it as `false`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The underlying allocator could not provide the requested memory, or the
    /// request does not fit in a valid layout.
    #[error("memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        Self::new(std::io::ErrorKind::OutOfMemory, e)
    }
}
