//! Intrusive singly-linked list for pool-resident records.
//!
//! The large-allocation and cleanup registries keep their records inside pool
//! memory. Each record embeds its own `next` pointer, so linking a record costs
//! no extra allocation. Records are only ever prepended and are never unlinked;
//! the memory backing them is released together with the pool.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A node in an intrusive singly-linked list.
#[derive(Debug)]
pub struct IntrusiveNode<T> {
    pub(crate) next: Option<NonNull<Self>>,
    pub(crate) data: T,
}

impl<T> IntrusiveNode<T> {
    /// Creates a new unlinked node with the given data.
    pub const fn new(data: T) -> Self {
        Self { next: None, data }
    }
}

/// An intrusive singly-linked list with prepend-only insertion.
///
/// This list does not own its nodes. The head is kept in a [`Cell`] so that
/// nodes can be linked through a shared reference to the owning pool.
///
/// # Safety
///
/// The caller must ensure that:
/// - Nodes are not freed or moved while linked in the list
/// - Nodes are only linked in one list at a time
pub struct IntrusiveList<T> {
    head: Cell<Option<NonNull<IntrusiveNode<T>>>>,
    len: Cell<usize>,
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntrusiveList<T> {
    /// Creates a new empty intrusive list.
    pub const fn new() -> Self {
        Self {
            head: Cell::new(None),
            len: Cell::new(0),
        }
    }

    /// Returns the number of nodes in the list.
    pub fn len(&self) -> usize {
        self.len.get()
    }

    /// Returns `true` if the list is empty.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    /// Pushes a node to the front of the list.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `node` points to a valid, initialized `IntrusiveNode`
    /// - `node` stays valid and in place for as long as the list is used
    /// - `node` is not already in any list
    pub unsafe fn push_front(&self, node: NonNull<IntrusiveNode<T>>) {
        // SAFETY: Caller guarantees node is valid and unlinked
        unsafe {
            (*node.as_ptr()).next = self.head.get();
        }
        self.head.set(Some(node));
        self.len.set(self.len.get() + 1);
    }

    /// Returns an iterator over the linked nodes, most recently pushed first.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.get(),
            _list: PhantomData,
        }
    }

    /// Unlinks every node at once, returning an iterator over them.
    ///
    /// The nodes themselves are untouched; their memory stays owned by whoever
    /// allocated it.
    pub fn take(&self) -> Iter<'_, T> {
        self.len.set(0);
        Iter {
            next: self.head.take(),
            _list: PhantomData,
        }
    }
}

/// Iterator over the nodes of an [`IntrusiveList`].
///
/// The successor is read before a node is yielded, so callers may mutate the
/// yielded node's data freely.
pub struct Iter<'a, T> {
    next: Option<NonNull<IntrusiveNode<T>>>,
    _list: PhantomData<&'a IntrusiveList<T>>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = NonNull<IntrusiveNode<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        // SAFETY: linked nodes stay valid while the list is borrowed
        self.next = unsafe { (*node.as_ptr()).next };
        Some(node)
    }
}
