//! Bump-allocated memory blocks.
//!
//! A [`Block`] is one contiguous region taken from the underlying allocator.
//! Small allocations are carved from it by advancing a cursor; nothing carved
//! from a block is ever given back until the whole block is released.
//!
//! All pointer arithmetic of the pool is confined to this module. Cursors are
//! kept as byte offsets from the block's base, so the bounds checks are plain
//! integer comparisons and only the final offset-to-pointer step is unsafe.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::{Allocator, layout_for};
use crate::config::{ALIGNMENT, BLOCK_ALIGNMENT, align_up};
use crate::error::Result;

/// One contiguous region of pool memory with a bump cursor.
#[derive(Debug)]
pub struct Block {
    /// Start of the region, aligned to [`BLOCK_ALIGNMENT`].
    base: NonNull<u8>,

    /// Offset of the next free byte. Never decreases.
    last: Cell<usize>,

    /// Offset one past the last usable byte (the block's capacity).
    end: usize,

    /// Number of times a small allocation escalated past this block.
    failed: Cell<usize>,
}

impl Block {
    /// Allocates a new block of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails.
    pub fn new(allocator: &dyn Allocator, capacity: usize) -> Result<Self> {
        let layout = layout_for(capacity, BLOCK_ALIGNMENT)?;
        let base = allocator.allocate(layout)?;
        Ok(Self {
            base,
            last: Cell::new(0),
            end: capacity,
            failed: Cell::new(0),
        })
    }

    /// Carves `size` bytes aligned to [`ALIGNMENT`] from the block.
    ///
    /// Returns `None` and leaves the cursor untouched if the remaining space
    /// is too small.
    #[inline]
    pub fn try_bump(&self, size: usize) -> Option<NonNull<u8>> {
        let aligned = align_up(self.last.get(), ALIGNMENT);
        let remaining = self.end.checked_sub(aligned)?;
        if remaining < size {
            return None;
        }

        self.last.set(aligned + size);
        // SAFETY: aligned <= end, so the offset stays within (or one past) the
        // region allocated for this block
        Some(unsafe { self.base.add(aligned) })
    }

    /// Returns `true` if `ptr` points into this block's region.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        addr >= start && addr < start + self.end
    }

    /// Start of the block's region.
    #[cfg(test)]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Total capacity of the block in bytes.
    pub const fn capacity(&self) -> usize {
        self.end
    }

    /// Bytes consumed so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.last.get()
    }

    /// Current value of the failure counter.
    #[cfg(test)]
    pub fn failed(&self) -> usize {
        self.failed.get()
    }

    /// Increments the failure counter, returning its previous value.
    pub fn record_failure(&self) -> usize {
        let previous = self.failed.get();
        self.failed.set(previous + 1);
        previous
    }

    /// Returns the block's memory to the allocator.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `allocator` is the allocator this block was created with
    /// - The block is released at most once and not used afterwards
    pub unsafe fn release(&self, allocator: &dyn Allocator) {
        if let Ok(layout) = layout_for(self.end, BLOCK_ALIGNMENT) {
            // SAFETY: base was allocated with this layout in Block::new
            unsafe { allocator.deallocate(self.base, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;

    #[test]
    fn test_block_creation() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 1024).unwrap();

        assert_eq!(block.capacity(), 1024);
        assert_eq!(block.used(), 0);
        assert_eq!(block.failed(), 0);
        assert_eq!(block.base().as_ptr() as usize % BLOCK_ALIGNMENT, 0);

        unsafe { block.release(&allocator) };
    }

    #[test]
    fn test_bump_is_aligned_and_sequential() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 1024).unwrap();

        let a = block.try_bump(3).unwrap();
        let b = block.try_bump(5).unwrap();
        let c = block.try_bump(ALIGNMENT).unwrap();

        assert_eq!(a, block.base());
        assert_eq!(b.as_ptr() as usize, a.as_ptr() as usize + ALIGNMENT);
        assert_eq!(c.as_ptr() as usize, b.as_ptr() as usize + ALIGNMENT);
        assert_eq!(block.used(), 3 * ALIGNMENT);

        for p in [a, b, c] {
            assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
            assert!(block.contains(p));
        }

        unsafe { block.release(&allocator) };
    }

    #[test]
    fn test_bump_exhaustion_leaves_cursor() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 64).unwrap();

        assert!(block.try_bump(64 - ALIGNMENT + 1).is_some());
        let used = block.used();

        // Padding pushes the cursor to 64, leaving nothing
        assert!(block.try_bump(1).is_none());
        assert_eq!(block.used(), used);

        unsafe { block.release(&allocator) };
    }

    #[test]
    fn test_bump_exact_fit() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 64).unwrap();

        assert!(block.try_bump(64).is_some());
        assert_eq!(block.used(), 64);
        assert!(block.try_bump(1).is_none());

        unsafe { block.release(&allocator) };
    }

    #[test]
    fn test_record_failure() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 64).unwrap();

        assert_eq!(block.record_failure(), 0);
        assert_eq!(block.record_failure(), 1);
        assert_eq!(block.failed(), 2);

        unsafe { block.release(&allocator) };
    }

    #[test]
    fn test_contains_bounds() {
        let allocator = DefaultAllocator::new();
        let block = Block::new(&allocator, 64).unwrap();

        let base = block.base();
        assert!(block.contains(base));
        assert!(block.contains(unsafe { base.add(63) }));
        assert!(!block.contains(unsafe { base.add(64) }));

        unsafe { block.release(&allocator) };
    }
}
