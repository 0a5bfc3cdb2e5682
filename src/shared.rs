//! A pool shared between threads and tasks.
//!
//! [`Pool`] itself has no locking. [`SharedPool`] puts the whole pool behind a
//! single `tokio::sync::Mutex`, so every operation is serialized. Pointers
//! returned by the shared entry points are raw: dereferencing them is the
//! caller's responsibility, and they stay valid until the last clone of the
//! shared pool is dropped (or, for large allocations, until freed).

use std::ptr::NonNull;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::pool::Pool;

/// A cloneable handle to a mutex-protected [`Pool`].
///
/// # Example
///
/// ```rust
/// use ruapc_mempool::{Pool, SharedPool};
///
/// # fn main() -> ruapc_mempool::Result<()> {
/// let pool = SharedPool::new(Pool::new(16 * 1024)?);
/// let other = pool.clone();
///
/// let handle = std::thread::spawn(move || other.allocate(128).map(|p| p.as_ptr() as usize));
/// let ptr = pool.allocate(64)?;
/// let theirs = handle.join().unwrap()?;
/// assert_ne!(ptr.as_ptr() as usize, theirs);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SharedPool {
    inner: Arc<Mutex<Pool>>,
}

impl SharedPool {
    /// Wraps `pool` for shared use.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    /// Allocates `size` bytes, blocking the current thread while waiting for
    /// the lock.
    ///
    /// For async contexts, use [`async_allocate`](Self::async_allocate) instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.inner.blocking_lock().allocate(size)
    }

    /// Allocates `size` bytes, waiting asynchronously for the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying allocator fails.
    pub async fn async_allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.inner.lock().await.allocate(size)
    }

    /// Releases a large allocation, blocking while waiting for the lock.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn free_large(&self, ptr: NonNull<u8>) -> bool {
        self.inner.blocking_lock().free_large(ptr)
    }

    /// Releases a large allocation, waiting asynchronously for the lock.
    pub async fn async_free_large(&self, ptr: NonNull<u8>) -> bool {
        self.inner.lock().await.free_large(ptr)
    }

    /// Locks the pool for a sequence of operations.
    pub async fn lock(&self) -> MutexGuard<'_, Pool> {
        self.inner.lock().await
    }

    /// Locks the pool for a sequence of operations, blocking the current thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_lock(&self) -> MutexGuard<'_, Pool> {
        self.inner.blocking_lock()
    }

    /// Unwraps the pool if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns the handle back if other clones are still alive.
    pub fn try_into_inner(self) -> std::result::Result<Pool, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl std::fmt::Debug for SharedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPool")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::DEFAULT_SIZE;

    #[test]
    fn test_blocking_allocation() {
        let pool = SharedPool::new(Pool::new(DEFAULT_SIZE).unwrap());
        let small = pool.allocate(128).unwrap();
        let large = pool.allocate(8192).unwrap();

        {
            let guard = pool.blocking_lock();
            assert!(guard.owns(small));
            assert!(guard.is_large(large));
        }

        assert!(pool.free_large(large));
        assert!(!pool.free_large(large));
    }

    #[test]
    fn test_threads_get_disjoint_memory() {
        let pool = SharedPool::new(Pool::new(4096).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .map(|_| pool.allocate(100).unwrap().as_ptr() as usize)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for addr in handle.join().unwrap() {
                assert!(seen.insert(addr));
            }
        }
        assert_eq!(seen.len(), 256);

        let pool = pool.try_into_inner().unwrap();
        assert!(pool.block_count() > 1);
    }

    #[tokio::test]
    async fn test_async_allocation() {
        let pool = SharedPool::new(Pool::new(DEFAULT_SIZE).unwrap());
        let ptr = pool.async_allocate(5000).await.unwrap();
        assert_eq!(pool.lock().await.large_count(), 1);
        assert!(pool.async_free_large(ptr).await);
        assert_eq!(pool.lock().await.large_count(), 0);
    }

    #[tokio::test]
    async fn test_async_tasks_share_pool() {
        let pool = SharedPool::new(Pool::new(DEFAULT_SIZE).unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let size = if i % 2 == 0 { 64 } else { 6000 };
                    pool.async_allocate(size).await.map(|p| p.as_ptr() as usize)
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            assert!(seen.insert(task.await.unwrap().unwrap()));
        }
        assert_eq!(pool.lock().await.large_count(), 4);
    }

    #[test]
    fn test_try_into_inner_with_clones() {
        let pool = SharedPool::new(Pool::new(DEFAULT_SIZE).unwrap());
        let other = pool.clone();

        let pool = pool.try_into_inner().unwrap_err();
        drop(other);
        assert!(pool.try_into_inner().is_ok());
    }
}
