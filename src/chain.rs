//! The ordered chain of blocks behind one pool.
//!
//! The chain owns every [`Block`] of a pool. Blocks are only appended, never
//! removed or reordered, so a block index stays valid for the pool's lifetime
//! and the `current` hint is stored as an index.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::block::Block;
use crate::config::{ALIGNMENT, FAILED_THRESHOLD};
use crate::error::{Error, Result};

/// Singly ordered list of blocks with a "first block worth trying" hint.
#[derive(Debug)]
pub struct BlockChain {
    blocks: RefCell<Vec<Block>>,

    /// Index of the first block scanned by small allocations.
    current: Cell<usize>,
}

impl BlockChain {
    /// Creates a chain holding only `first`.
    pub fn new(first: Block) -> Self {
        Self {
            blocks: RefCell::new(vec![first]),
            current: Cell::new(0),
        }
    }

    /// Bump-allocates `size` bytes from the first block at or after `current`
    /// that has room.
    ///
    /// Blocks before `current` are never revisited.
    pub fn try_allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let blocks = self.blocks.borrow();
        blocks[self.current.get()..]
            .iter()
            .find_map(|block| block.try_bump(size))
    }

    /// Appends a fresh block of `capacity` bytes and carves `size` bytes from it.
    ///
    /// Every block from `current` up to (but excluding) the old tail has its
    /// failure counter bumped; a block that had already failed more than
    /// [`FAILED_THRESHOLD`] times moves `current` past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails. The chain is left
    /// unchanged in that case.
    pub fn grow(
        &self,
        allocator: &dyn Allocator,
        capacity: usize,
        size: usize,
    ) -> Result<NonNull<u8>> {
        let block = Block::new(allocator, capacity)?;
        let Some(ptr) = block.try_bump(size) else {
            // SAFETY: the block was just created by this allocator and is dropped here
            unsafe { block.release(allocator) };
            return Err(Error::AllocationFailed {
                size,
                align: ALIGNMENT,
            });
        };

        let mut blocks = self.blocks.borrow_mut();
        let tail = blocks.len() - 1;
        let mut current = self.current.get();
        for (index, visited) in blocks.iter().enumerate().take(tail).skip(current) {
            if visited.record_failure() > FAILED_THRESHOLD {
                current = index + 1;
            }
        }
        blocks.push(block);
        self.current.set(current);

        tracing::debug!(
            blocks = blocks.len(),
            current,
            capacity,
            "pool chain grew by one block"
        );

        Ok(ptr)
    }

    /// Number of blocks in the chain.
    pub fn len(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Index of the first block scanned by small allocations.
    pub fn current(&self) -> usize {
        self.current.get()
    }

    /// Returns `true` if `ptr` lies inside any block of the chain.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.blocks.borrow().iter().any(|block| block.contains(ptr))
    }

    /// Failure counters of every block, head first.
    #[cfg(test)]
    pub fn failures(&self) -> Vec<usize> {
        self.blocks.borrow().iter().map(Block::failed).collect()
    }

    /// Total bytes consumed across all blocks.
    pub fn used(&self) -> usize {
        self.blocks.borrow().iter().map(Block::used).sum()
    }

    /// Total capacity across all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.borrow().iter().map(Block::capacity).sum()
    }

    /// Releases every block, head first.
    ///
    /// # Safety
    ///
    /// The caller must ensure `allocator` created every block and that no
    /// pointer into the chain is used afterwards.
    pub unsafe fn release_all(&self, allocator: &dyn Allocator) {
        for block in self.blocks.borrow_mut().drain(..) {
            // SAFETY: each block is drained, hence released exactly once
            unsafe { block.release(allocator) };
        }
        self.current.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;

    fn chain_of(allocator: &DefaultAllocator, capacity: usize) -> BlockChain {
        BlockChain::new(Block::new(allocator, capacity).unwrap())
    }

    #[test]
    fn test_allocates_from_head() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 256);

        let p = chain.try_allocate(100).unwrap();
        assert!(chain.contains(p));
        assert_eq!(chain.len(), 1);

        unsafe { chain.release_all(&allocator) };
    }

    #[test]
    fn test_grow_appends_uniform_block() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 256);

        assert!(chain.try_allocate(200).is_some());
        assert!(chain.try_allocate(200).is_none());

        let p = chain.grow(&allocator, 256, 200).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.capacity(), 512);
        assert!(chain.contains(p));

        // The grown block starts partially consumed
        assert!(chain.try_allocate(200).is_none());

        unsafe { chain.release_all(&allocator) };
    }

    #[test]
    fn test_grow_excludes_old_tail_from_failures() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 64);

        chain.grow(&allocator, 64, 64).unwrap();
        // Single-block chain: the old tail is the head, nothing visited
        assert_eq!(chain.failures(), vec![0, 0]);

        chain.grow(&allocator, 64, 64).unwrap();
        assert_eq!(chain.failures(), vec![1, 0, 0]);

        unsafe { chain.release_all(&allocator) };
    }

    #[test]
    fn test_current_advances_past_exhausted_blocks() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 64);
        chain.grow(&allocator, 64, 64).unwrap();

        // The head is visited on every later growth; once its counter has
        // passed the threshold, current skips it.
        for _ in 0..=FAILED_THRESHOLD {
            chain.grow(&allocator, 64, 64).unwrap();
            assert_eq!(chain.current(), 0);
        }
        chain.grow(&allocator, 64, 64).unwrap();
        assert!(chain.current() > 0);
        assert!(chain.current() < chain.len());

        unsafe { chain.release_all(&allocator) };
    }

    #[test]
    fn test_blocks_before_current_are_skipped() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 64);

        for _ in 0..FAILED_THRESHOLD + 3 {
            chain.grow(&allocator, 64, 8).unwrap();
        }
        let current = chain.current();
        assert!(current > 0);

        // The head still has free space, but it lies before current
        let p = chain.try_allocate(8).unwrap();
        let blocks = chain.blocks.borrow();
        assert!(!blocks[0].contains(p));
        assert!(blocks[current..].iter().any(|b| b.contains(p)));
        drop(blocks);

        unsafe { chain.release_all(&allocator) };
    }

    #[test]
    fn test_release_all() {
        let allocator = DefaultAllocator::new();
        let chain = chain_of(&allocator, 64);
        chain.grow(&allocator, 64, 8).unwrap();

        unsafe { chain.release_all(&allocator) };
        assert_eq!(chain.len(), 0);
    }
}
