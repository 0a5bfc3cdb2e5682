//! Registry of large allocations.
//!
//! Requests above a pool's threshold bypass the blocks and are served by the
//! underlying allocator directly. Each such buffer is tracked by a
//! [`LargeRecord`] living in pool memory, so it can be released on its own
//! with [`Pool::free_large`](crate::Pool::free_large) or together with the pool.
//!
//! A released buffer leaves its record behind as an empty slot. Later large
//! allocations reuse empty slots found near the head of the list.

use std::ptr::NonNull;

use crate::allocator::{Allocator, layout_for};
use crate::config::{ALIGNMENT, BLOCK_ALIGNMENT, LARGE_SCAN_LIMIT};
use crate::intrusive_list::{IntrusiveList, IntrusiveNode};

/// One tracked large buffer, or an empty slot.
#[derive(Debug)]
pub struct LargeSlot {
    /// The buffer, `None` once it has been freed.
    alloc: Option<NonNull<u8>>,
    /// Size the buffer was allocated with.
    size: usize,
}

/// A large-allocation record as laid out in pool memory.
pub type LargeRecord = IntrusiveNode<LargeSlot>;

const _: () = assert!(align_of::<LargeRecord>() <= ALIGNMENT);

/// Prepend-ordered list of large-allocation records.
#[derive(Default)]
pub struct LargeRegistry {
    list: IntrusiveList<LargeSlot>,
}

impl LargeRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            list: IntrusiveList::new(),
        }
    }

    /// Stores `ptr` in an empty slot among the first [`LARGE_SCAN_LIMIT`]
    /// records. Returns `false` if none was found.
    pub fn claim_empty(&self, ptr: NonNull<u8>, size: usize) -> bool {
        for node in self.list.iter().take(LARGE_SCAN_LIMIT) {
            // SAFETY: linked records live in pool memory for the pool's lifetime
            let slot = unsafe { &mut (*node.as_ptr()).data };
            if slot.alloc.is_none() {
                slot.alloc = Some(ptr);
                slot.size = size;
                return true;
            }
        }
        false
    }

    /// Writes a new record tracking `ptr` into `record` and links it at the head.
    ///
    /// # Safety
    ///
    /// The caller must ensure `record` is valid for writes of a
    /// [`LargeRecord`], suitably aligned, and stays valid while the registry
    /// is in use.
    pub unsafe fn push(&self, record: NonNull<LargeRecord>, ptr: NonNull<u8>, size: usize) {
        let slot = LargeSlot {
            alloc: Some(ptr),
            size,
        };
        // SAFETY: caller guarantees record is writable and aligned
        unsafe {
            record.as_ptr().write(IntrusiveNode::new(slot));
            self.list.push_front(record);
        }
    }

    /// Releases the buffer at `ptr` if it is tracked here, leaving an empty slot.
    ///
    /// # Safety
    ///
    /// The caller must ensure `allocator` is the one every tracked buffer was
    /// allocated with.
    pub unsafe fn release(&self, ptr: NonNull<u8>, allocator: &dyn Allocator) -> bool {
        for node in self.list.iter() {
            // SAFETY: linked records live in pool memory for the pool's lifetime
            let slot = unsafe { &mut (*node.as_ptr()).data };
            if slot.alloc == Some(ptr) {
                // SAFETY: the slot owned this buffer and is cleared right after
                unsafe { release_slot(slot, allocator) };
                return true;
            }
        }
        false
    }

    /// Releases every tracked buffer and unlinks all records.
    ///
    /// # Safety
    ///
    /// Same contract as [`release`](Self::release); no tracked pointer may be
    /// used afterwards.
    pub unsafe fn release_all(&self, allocator: &dyn Allocator) -> usize {
        let mut released = 0;
        for node in self.list.take() {
            // SAFETY: records are still in pool memory, blocks are freed later
            let slot = unsafe { &mut (*node.as_ptr()).data };
            if slot.alloc.is_some() {
                // SAFETY: each live slot owns its buffer
                unsafe { release_slot(slot, allocator) };
                released += 1;
            }
        }
        released
    }

    /// Number of records whose buffer is still live.
    pub fn live(&self) -> usize {
        self.list
            .iter()
            // SAFETY: linked records live in pool memory for the pool's lifetime
            .filter(|node| unsafe { (*node.as_ptr()).data.alloc.is_some() })
            .count()
    }

    /// Number of records, live or empty.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Number of records currently tracking `ptr`.
    pub fn occurrences(&self, ptr: NonNull<u8>) -> usize {
        self.list
            .iter()
            // SAFETY: linked records live in pool memory for the pool's lifetime
            .filter(|node| unsafe { (*node.as_ptr()).data.alloc == Some(ptr) })
            .count()
    }
}

/// Frees the slot's buffer and marks the slot empty.
///
/// # Safety
///
/// `slot.alloc` must be a buffer allocated by `allocator` with `slot.size`.
unsafe fn release_slot(slot: &mut LargeSlot, allocator: &dyn Allocator) {
    if let Some(ptr) = slot.alloc.take() {
        if let Ok(layout) = layout_for(slot.size, BLOCK_ALIGNMENT) {
            // SAFETY: the buffer was allocated with this layout
            unsafe { allocator.deallocate(ptr, layout) };
        }
        tracing::trace!(size = slot.size, "released large allocation");
    }
}
