//! Compile-time pool configuration.
//!
//! These constants are the defaults used by [`PoolBuilder`](crate::PoolBuilder).
//! The page size can be overridden per pool; everything else is fixed.

use crate::large::LargeRecord;

/// Page size used to derive the small-allocation threshold.
pub const PAGE_SIZE: usize = 4 * 1024;

/// Largest request served from the bump allocator with the default page size.
pub const MAX_ALLOC_FROM_POOL: usize = PAGE_SIZE - 1;

/// Default initial pool size (16 KiB).
pub const DEFAULT_SIZE: usize = 16 * 1024;

/// Alignment of every block and large buffer taken from the underlying allocator.
pub const BLOCK_ALIGNMENT: usize = 16;

/// Alignment of individual small allocations (pointer width).
pub const ALIGNMENT: usize = size_of::<usize>();

/// Smallest pool that can still track two large allocations.
pub const MIN_SIZE: usize = align_up(2 * size_of::<LargeRecord>(), BLOCK_ALIGNMENT);

/// Maximum number of large records inspected when looking for an empty slot.
pub const LARGE_SCAN_LIMIT: usize = 4;

/// A block that failed more than this many times is skipped by later scans.
pub const FAILED_THRESHOLD: usize = 4;

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}
