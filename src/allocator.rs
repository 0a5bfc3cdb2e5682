//! Underlying allocator trait and default implementation.
//!
//! This module provides the [`Allocator`] trait that defines where a pool takes
//! its blocks and large buffers from, and [`DefaultAllocator`] which uses the
//! standard library's global allocator.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Trait for memory allocation backends.
///
/// A pool calls `allocate` for every new block and every large buffer, and
/// `deallocate` when a large buffer is freed or the pool is destroyed.
///
/// # Safety
///
/// Implementations must ensure:
/// - `allocate` returns a pointer valid for `layout.size()` bytes and aligned
///   to `layout.align()`
/// - The allocated memory remains valid until `deallocate` is called
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
/// use std::ptr::NonNull;
/// use ruapc_mempool::{Allocator, DefaultAllocator, Result};
///
/// struct Logging(DefaultAllocator);
///
/// impl Allocator for Logging {
///     fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
///         println!("allocate {} bytes", layout.size());
///         self.0.allocate(layout)
///     }
///
///     unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
///         // SAFETY: forwarded contract
///         unsafe { self.0.deallocate(ptr, layout) }
///     }
/// }
/// ```
pub trait Allocator: Send + Sync {
    /// Allocates memory described by `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the memory cannot be provided.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Deallocates memory previously allocated by this allocator.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `ptr` was returned by a previous call to `allocate` on this allocator
    /// - `layout` matches the layout passed to that call
    /// - The memory has not already been deallocated
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Default allocator using the standard library's global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl DefaultAllocator {
    /// Creates a new default allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(alloc_failed(layout));
        }

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| alloc_failed(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: ptr was allocated with this layout by allocate()
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}

/// Builds a layout, mapping overflow to an allocation failure.
pub(crate) fn layout_for(size: usize, align: usize) -> Result<Layout> {
    Layout::from_size_align(size, align).map_err(|_| Error::AllocationFailed { size, align })
}

pub(crate) const fn alloc_failed(layout: Layout) -> Error {
    Error::AllocationFailed {
        size: layout.size(),
        align: layout.align(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allocator_basic() {
        let allocator = DefaultAllocator::new();

        let layout = Layout::from_size_align(16 * 1024, 16).unwrap();
        let ptr = allocator.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);

        // Write and read back
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xAB, layout.size());
            assert_eq!(*ptr.as_ptr(), 0xAB);
            assert_eq!(*ptr.as_ptr().add(layout.size() - 1), 0xAB);
        }

        unsafe {
            allocator.deallocate(ptr, layout);
        }
    }

    #[test]
    fn test_default_allocator_zero_size() {
        let allocator = DefaultAllocator::new();
        let layout = Layout::from_size_align(0, 16).unwrap();
        assert_eq!(
            allocator.allocate(layout),
            Err(Error::AllocationFailed { size: 0, align: 16 })
        );
    }

    #[test]
    fn test_layout_overflow() {
        let result = layout_for(usize::MAX, 16);
        assert_eq!(
            result,
            Err(Error::AllocationFailed {
                size: usize::MAX,
                align: 16
            })
        );
    }
}
