//! Zero-initialized heap buffer independent of any pool.
//!
//! This module provides [`allocate_zeroed`] and the [`HeapBuffer`] it returns.
//! The buffer comes straight from the underlying allocator and is released
//! when dropped; it never participates in a pool's bump or large routing.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::allocator::{Allocator, DefaultAllocator, layout_for};
use crate::config::BLOCK_ALIGNMENT;
use crate::error::Result;

/// Allocates a zero-filled buffer of `size` bytes from the global allocator.
///
/// A zero-sized request yields an empty buffer without touching the allocator.
///
/// # Errors
///
/// Returns [`Error::AllocationFailed`](crate::Error::AllocationFailed) if the
/// allocator cannot provide the memory.
///
/// # Example
///
/// ```rust
/// # fn main() -> ruapc_mempool::Result<()> {
/// let buffer = ruapc_mempool::allocate_zeroed(1024)?;
/// assert_eq!(buffer.len(), 1024);
/// assert!(buffer.iter().all(|&b| b == 0));
/// # Ok(())
/// # }
/// ```
pub fn allocate_zeroed(size: usize) -> Result<HeapBuffer> {
    if size == 0 {
        return Ok(HeapBuffer {
            ptr: NonNull::dangling(),
            len: 0,
        });
    }

    let ptr = DefaultAllocator::new().allocate(layout_for(size, BLOCK_ALIGNMENT)?)?;
    // SAFETY: ptr is valid for size bytes
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
    Ok(HeapBuffer { ptr, len: size })
}

/// An owned, zero-initialized byte buffer.
///
/// The memory is returned to the global allocator when the buffer is dropped.
pub struct HeapBuffer {
    /// Pointer to the allocated memory.
    ptr: NonNull<u8>,

    /// Size of the allocated memory.
    len: usize,
}

// SAFETY: HeapBuffer exclusively owns its memory
unsafe impl Send for HeapBuffer {}

// SAFETY: shared access only hands out shared slices
unsafe impl Sync for HeapBuffer {}

impl HeapBuffer {
    /// Returns the length of the buffer in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the buffer is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a raw pointer to the buffer's memory.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns a mutable raw pointer to the buffer's memory.
    #[inline]
    #[must_use]
    pub const fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the buffer as a byte slice.
    #[inline]
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialized for len bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the buffer as a mutable byte slice.
    #[inline]
    #[must_use]
    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and we have exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = layout_for(self.len, BLOCK_ALIGNMENT) {
            // SAFETY: the buffer was allocated with this layout in allocate_zeroed
            unsafe { DefaultAllocator::new().deallocate(self.ptr, layout) };
        }
    }
}

impl Deref for HeapBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for HeapBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for HeapBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for HeapBuffer {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl std::fmt::Debug for HeapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
