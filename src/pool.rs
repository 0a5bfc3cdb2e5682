//! Region pool implementation.
//!
//! This module provides the [`Pool`] and [`PoolBuilder`] types. A pool hands
//! out small allocations by bumping a cursor through a chain of equally sized
//! blocks, routes large allocations to the underlying allocator while keeping
//! track of them, and releases everything at once when destroyed.

use std::ptr::NonNull;

use crate::allocator::{Allocator, DefaultAllocator, layout_for};
use crate::block::Block;
use crate::chain::BlockChain;
use crate::cleanup::{CleanupHandle, CleanupRecord, CleanupRegistry};
use crate::config::{BLOCK_ALIGNMENT, DEFAULT_SIZE, MIN_SIZE, PAGE_SIZE};
use crate::error::Result;
use crate::large::{LargeRecord, LargeRegistry};

/// Builder for creating a [`Pool`] with custom configuration.
///
/// # Example
///
/// ```rust
/// use ruapc_mempool::PoolBuilder;
///
/// # fn main() -> ruapc_mempool::Result<()> {
/// let pool = PoolBuilder::new()
///     .size(64 * 1024)
///     .page_size(8 * 1024)
///     .build()?;
/// assert_eq!(pool.max(), 8 * 1024 - 1);
/// # Ok(())
/// # }
/// ```
pub struct PoolBuilder {
    size: usize,
    page_size: usize,
    allocator: Box<dyn Allocator>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Default settings:
    /// - Size: 16 KiB
    /// - Page size: 4 KiB
    /// - Allocator: [`DefaultAllocator`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            size: DEFAULT_SIZE,
            page_size: PAGE_SIZE,
            allocator: Box::new(DefaultAllocator::new()),
        }
    }

    /// Sets the size of every block in the pool.
    ///
    /// Sizes below [`MIN_SIZE`] are raised to it.
    #[must_use]
    pub const fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets the page size. Requests of `page_size` bytes or more are large.
    #[must_use]
    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets a custom allocator for blocks and large buffers.
    #[must_use]
    pub fn allocator(mut self, allocator: Box<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Builds the pool, reserving its first block.
    ///
    /// # Errors
    ///
    /// Returns an error if the first block cannot be allocated.
    pub fn build(self) -> Result<Pool> {
        let total_size = self.size.max(MIN_SIZE);
        let max = total_size.min(self.page_size.saturating_sub(1));

        let first = Block::new(self.allocator.as_ref(), total_size)?;
        tracing::debug!(total_size, max, "created memory pool");

        Ok(Pool {
            chain: BlockChain::new(first),
            large: LargeRegistry::new(),
            cleanup: CleanupRegistry::new(),
            max,
            total_size,
            allocator: self.allocator,
        })
    }
}

/// A region-based memory pool.
///
/// Small allocations (up to [`max`](Self::max) bytes) are bump-allocated from
/// the pool's blocks and live until the pool is destroyed. Larger allocations
/// come from the underlying allocator and can be released early with
/// [`free_large`](Self::free_large).
///
/// # Thread Safety
///
/// A pool is `Send` but not `Sync`: it has no internal locking. Wrap it in a
/// [`SharedPool`](crate::SharedPool) to use it from several threads.
///
/// # Example
///
/// ```rust
/// use ruapc_mempool::Pool;
///
/// # fn main() -> ruapc_mempool::Result<()> {
/// let pool = Pool::new(16 * 1024)?;
///
/// let msg = pool.allocate_str("Hello")?;
/// assert_eq!(msg, "Hello");
///
/// let big = pool.allocate_bytes(8 * 1024)?;
/// big[0] = 1;
///
/// // Everything is released at once
/// pool.destroy();
/// # Ok(())
/// # }
/// ```
pub struct Pool {
    /// Blocks serving small allocations.
    chain: BlockChain,

    /// Buffers above the threshold.
    large: LargeRegistry,

    /// Callbacks run at destruction.
    cleanup: CleanupRegistry,

    /// Largest request served from the blocks.
    max: usize,

    /// Capacity of every block in the chain.
    total_size: usize,

    /// Source of blocks and large buffers.
    allocator: Box<dyn Allocator>,
}

// SAFETY: the pool exclusively owns every block, record and large buffer it
// points to; cleanup handlers are `Send` and the allocator is `Send + Sync`.
// The pool is not `Sync`, so all access stays on one thread at a time.
unsafe impl Send for Pool {}

impl Pool {
    /// Creates a pool whose blocks hold `size` bytes each.
    ///
    /// This is equivalent to `PoolBuilder::new().size(size).build()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first block cannot be allocated.
    pub fn new(size: usize) -> Result<Self> {
        PoolBuilder::new().size(size).build()
    }

    /// Allocates `size` bytes.
    ///
    /// Requests up to [`max`](Self::max) bytes are carved from the pool's
    /// blocks, aligned to [`ALIGNMENT`](crate::config::ALIGNMENT), and stay
    /// valid until the pool is destroyed. Larger requests are allocated
    /// directly, aligned to [`BLOCK_ALIGNMENT`], and stay valid until freed
    /// with [`free_large`](Self::free_large) or the pool is destroyed.
    ///
    /// The memory is uninitialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails. The pool is left
    /// unchanged in that case.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if size <= self.max {
            self.allocate_small(size)
        } else {
            self.allocate_large(size)
        }
    }

    /// Allocates a zero-filled byte slice that lives as long as the pool borrow.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate_bytes(&self, size: usize) -> Result<&mut [u8]> {
        let ptr = self.allocate(size)?;
        // SAFETY: ptr is valid for size bytes and handed out exactly once;
        // large buffers can only be freed through `&mut self`, which ends
        // this borrow first
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
            Ok(std::slice::from_raw_parts_mut(ptr.as_ptr(), size))
        }
    }

    /// Copies `s` into the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate_str(&self, s: &str) -> Result<&mut str> {
        let bytes = self.allocate_bytes(s.len())?;
        bytes.copy_from_slice(s.as_bytes());
        // SAFETY: the bytes were copied from a valid str
        Ok(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Bump-allocates from the chain, growing it if no block has room.
    fn allocate_small(&self, size: usize) -> Result<NonNull<u8>> {
        if let Some(ptr) = self.chain.try_allocate(size) {
            return Ok(ptr);
        }
        self.chain.grow(self.allocator.as_ref(), self.total_size, size)
    }

    /// Allocates a tracked buffer directly from the underlying allocator.
    fn allocate_large(&self, size: usize) -> Result<NonNull<u8>> {
        let layout = layout_for(size, BLOCK_ALIGNMENT)?;
        let ptr = self.allocator.allocate(layout)?;

        if self.large.claim_empty(ptr, size) {
            tracing::trace!(size, "reused large allocation record");
            return Ok(ptr);
        }

        let record = match self.allocate_small(size_of::<LargeRecord>()) {
            Ok(record) => record.cast::<LargeRecord>(),
            Err(e) => {
                // SAFETY: ptr was just allocated with this layout and is not tracked
                unsafe { self.allocator.deallocate(ptr, layout) };
                return Err(e);
            }
        };

        // SAFETY: record is fresh, aligned pool memory that lives as long as the pool
        unsafe { self.large.push(record, ptr, size) };
        tracing::trace!(size, records = self.large.len(), "tracked large allocation");
        Ok(ptr)
    }

    /// Releases a large allocation before the pool is destroyed.
    ///
    /// Returns `true` if `ptr` was a live large allocation of this pool and has
    /// been released, `false` otherwise (including for small allocations,
    /// which are never released individually). The record that tracked the
    /// buffer stays in place and is reused by a later large allocation.
    ///
    /// Taking `&mut self` ensures no slice returned by
    /// [`allocate_bytes`](Self::allocate_bytes) is still alive.
    pub fn free_large(&mut self, ptr: NonNull<u8>) -> bool {
        // SAFETY: every tracked buffer came from self.allocator
        unsafe { self.large.release(ptr, self.allocator.as_ref()) }
    }

    /// Registers a cleanup record, with a zero-filled data buffer of
    /// `data_size` bytes if non-zero.
    ///
    /// The returned handle's handler starts unset; set it with
    /// [`CleanupHandle::set_handler`]. Handlers run when the pool is destroyed,
    /// most recently registered first.
    ///
    /// # Errors
    ///
    /// Returns an error if the record or its data buffer cannot be allocated.
    pub fn register_cleanup(&self, data_size: usize) -> Result<CleanupHandle<'_>> {
        let record = self
            .allocate_small(size_of::<CleanupRecord>())?
            .cast::<CleanupRecord>();

        let data = if data_size > 0 {
            let data = self.allocate(data_size)?;
            // SAFETY: data is valid for data_size bytes
            unsafe { std::ptr::write_bytes(data.as_ptr(), 0, data_size) };
            Some(data)
        } else {
            None
        };

        // SAFETY: record is fresh, aligned pool memory and data is pool memory
        // sized data_size; both outlive the registry
        unsafe {
            self.cleanup.push(record, data, data_size);
            Ok(CleanupHandle::new(record))
        }
    }

    /// Destroys the pool.
    ///
    /// Runs every cleanup handler, releases every live large allocation and
    /// then every block. Dropping the pool has the same effect.
    pub fn destroy(self) {
        drop(self);
    }

    /// Largest request served from the pool's blocks.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Capacity of every block in the chain.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of blocks in the chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    /// Index of the first block scanned by small allocations.
    #[must_use]
    pub fn current_block(&self) -> usize {
        self.chain.current()
    }

    /// Bytes consumed from the blocks, including padding and records.
    #[must_use]
    pub fn used(&self) -> usize {
        self.chain.used()
    }

    /// Combined capacity of all blocks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chain.capacity()
    }

    /// Number of live large allocations.
    #[must_use]
    pub fn large_count(&self) -> usize {
        self.large.live()
    }

    /// Number of large-allocation records, including empty slots.
    #[must_use]
    pub fn large_record_count(&self) -> usize {
        self.large.len()
    }

    /// Returns `true` if `ptr` is a live large allocation of this pool.
    #[must_use]
    pub fn is_large(&self, ptr: NonNull<u8>) -> bool {
        self.large.occurrences(ptr) > 0
    }

    /// Number of registered cleanup records.
    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        self.cleanup.len()
    }

    /// Returns `true` if `ptr` lies inside one of the pool's blocks.
    #[must_use]
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.chain.contains(ptr)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let handlers = self.cleanup.run_all();

        // SAFETY: every buffer and block came from self.allocator, and the
        // pool is never used again
        let (large, blocks) = unsafe {
            let large = self.large.release_all(self.allocator.as_ref());
            let blocks = self.chain.len();
            self.chain.release_all(self.allocator.as_ref());
            (large, blocks)
        };

        tracing::debug!(handlers, large, blocks, "destroyed memory pool");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max", &self.max)
            .field("total_size", &self.total_size)
            .field("blocks", &self.chain.len())
            .field("current", &self.chain.current())
            .field("large", &self.large.live())
            .field("cleanup", &self.cleanup.len())
            .finish_non_exhaustive()
    }
}
