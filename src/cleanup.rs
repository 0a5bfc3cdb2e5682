//! Cleanup callbacks run when a pool is destroyed.
//!
//! A cleanup record lets the pool take over release logic for something the
//! pool's memory backs: a file handle stored in pool memory, a reference count
//! held on behalf of pool-allocated objects, and so on. Records and their data
//! buffers are bump-allocated from the pool; handlers run once, most recently
//! registered first.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::config::ALIGNMENT;
use crate::intrusive_list::{IntrusiveList, IntrusiveNode};

/// Callback invoked with the record's data pointer at pool destruction.
pub type CleanupFn = Box<dyn FnOnce(Option<NonNull<u8>>) + Send>;

/// Handler and data of one cleanup record.
pub struct Cleanup {
    handler: Option<CleanupFn>,
    data: Option<NonNull<u8>>,
    len: usize,
}

/// A cleanup record as laid out in pool memory.
pub type CleanupRecord = IntrusiveNode<Cleanup>;

const _: () = assert!(align_of::<CleanupRecord>() <= ALIGNMENT);

/// Prepend-ordered list of cleanup records.
#[derive(Default)]
pub struct CleanupRegistry {
    list: IntrusiveList<Cleanup>,
}

impl CleanupRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            list: IntrusiveList::new(),
        }
    }

    /// Writes a record without a handler into `record` and links it at the head.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `record` is valid for writes of a [`CleanupRecord`] and suitably aligned
    /// - `data`, if present, is valid for `len` bytes
    /// - Both stay valid until [`run_all`](Self::run_all) has been called
    pub unsafe fn push(&self, record: NonNull<CleanupRecord>, data: Option<NonNull<u8>>, len: usize) {
        let cleanup = Cleanup {
            handler: None,
            data,
            len,
        };
        // SAFETY: caller guarantees record is writable and aligned
        unsafe {
            record.as_ptr().write(IntrusiveNode::new(cleanup));
            self.list.push_front(record);
        }
    }

    /// Runs every handler that was set, most recently registered first, and
    /// unlinks all records. Returns the number of handlers invoked.
    pub fn run_all(&self) -> usize {
        let mut invoked = 0;
        for node in self.list.take() {
            // SAFETY: records live in pool memory until the blocks are released
            let cleanup = unsafe { &mut (*node.as_ptr()).data };
            if let Some(handler) = cleanup.handler.take() {
                handler(cleanup.data);
                invoked += 1;
            }
        }
        invoked
    }

    /// Number of registered records.
    pub fn len(&self) -> usize {
        self.list.len()
    }
}

/// Handle to a registered cleanup record.
///
/// The handle borrows the pool, so the record cannot outlive it. Set a
/// handler with [`set_handler`](Self::set_handler); a record without a handler
/// is skipped at destruction.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use ruapc_mempool::Pool;
///
/// # fn main() -> ruapc_mempool::Result<()> {
/// let closed = Arc::new(AtomicUsize::new(0));
/// let pool = Pool::new(4096)?;
///
/// let mut cleanup = pool.register_cleanup(8)?;
/// cleanup.data_mut().copy_from_slice(&7u64.to_ne_bytes());
/// let counter = Arc::clone(&closed);
/// cleanup.set_handler(move |_data| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// pool.destroy();
/// assert_eq!(closed.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
pub struct CleanupHandle<'a> {
    record: NonNull<CleanupRecord>,
    _pool: PhantomData<&'a ()>,
}

impl CleanupHandle<'_> {
    /// Wraps a linked record.
    ///
    /// # Safety
    ///
    /// `record` must be a record linked into a registry that outlives the handle.
    pub(crate) const unsafe fn new(record: NonNull<CleanupRecord>) -> Self {
        Self {
            record,
            _pool: PhantomData,
        }
    }

    fn cleanup(&self) -> &Cleanup {
        // SAFETY: the record is valid for the handle's lifetime
        unsafe { &(*self.record.as_ptr()).data }
    }

    fn cleanup_mut(&mut self) -> &mut Cleanup {
        // SAFETY: the record is valid for the handle's lifetime and the handle
        // is the only accessor until the pool is destroyed
        unsafe { &mut (*self.record.as_ptr()).data }
    }

    /// Sets the handler run at pool destruction, replacing any previous one.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnOnce(Option<NonNull<u8>>) + Send + 'static,
    {
        self.cleanup_mut().handler = Some(Box::new(handler));
    }

    /// Returns `true` if a handler has been set.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.cleanup().handler.is_some()
    }

    /// Pointer to the record's data buffer, `None` if registered with size 0.
    #[must_use]
    pub fn data(&self) -> Option<NonNull<u8>> {
        self.cleanup().data
    }

    /// Size of the record's data buffer.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.cleanup().len
    }

    /// The record's data buffer as a mutable byte slice.
    ///
    /// The buffer is zero-filled at registration.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (data, len) = (self.cleanup().data, self.cleanup().len);
        match data {
            // SAFETY: data is valid and initialized for len bytes, and only
            // reachable through this handle
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) },
            None => &mut [],
        }
    }
}

impl std::fmt::Debug for CleanupHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("data", &self.data())
            .field("data_len", &self.data_len())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn blank() -> CleanupRecord {
        IntrusiveNode::new(Cleanup {
            handler: None,
            data: None,
            len: 0,
        })
    }

    #[test]
    fn test_run_all_order_and_skip() {
        let registry = CleanupRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut records: Vec<CleanupRecord> = (0..3).map(|_| blank()).collect();

        for (i, record) in records.iter_mut().enumerate() {
            let record = NonNull::from(record);
            unsafe { registry.push(record, None, 0) };
            // The middle record never gets a handler
            if i != 1 {
                let mut handle = unsafe { CleanupHandle::new(record) };
                let order = Arc::clone(&order);
                handle.set_handler(move |_| order.lock().unwrap().push(i));
            }
        }

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.run_all(), 2);
        assert_eq!(*order.lock().unwrap(), vec![2, 0]);
        assert_eq!(registry.len(), 0);

        // Nothing runs twice
        assert_eq!(registry.run_all(), 0);
    }

    #[test]
    fn test_handler_receives_data() {
        let registry = CleanupRegistry::new();
        let mut record = blank();
        let mut data = [0u8; 4];
        let data_ptr = NonNull::new(data.as_mut_ptr()).unwrap();
        let record_ptr = NonNull::from(&mut record);

        let seen = Arc::new(Mutex::new(None));
        unsafe { registry.push(record_ptr, Some(data_ptr), data.len()) };
        let mut handle = unsafe { CleanupHandle::new(record_ptr) };
        assert_eq!(handle.data(), Some(data_ptr));
        assert_eq!(handle.data_len(), 4);
        handle.data_mut()[0] = 9;

        let sink = Arc::clone(&seen);
        handle.set_handler(move |p| {
            let p = p.unwrap();
            *sink.lock().unwrap() = Some((p.as_ptr() as usize, unsafe { *p.as_ptr() }));
        });
        assert!(handle.has_handler());

        registry.run_all();
        assert_eq!(*seen.lock().unwrap(), Some((data_ptr.as_ptr() as usize, 9)));
    }

    #[test]
    fn test_empty_data() {
        let registry = CleanupRegistry::new();
        let mut record = blank();
        let record_ptr = NonNull::from(&mut record);

        unsafe { registry.push(record_ptr, None, 0) };
        let mut handle = unsafe { CleanupHandle::new(record_ptr) };
        assert!(handle.data().is_none());
        assert!(handle.data_mut().is_empty());
        assert!(!handle.has_handler());
    }
}
