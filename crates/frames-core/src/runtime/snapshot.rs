//! Values readers load without taking a lock.
//!
//! Readers pin the current epoch and dereference whatever value is
//! published. Writers serialize among themselves, edit a copy and swap it
//! in; the replaced value is reclaimed once every reader pinned before the
//! swap has unpinned.

use std::{fmt, sync::atomic::Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use parking_lot::Mutex;

pub(crate) struct SnapshotCell<T> {
    current: Atomic<T>,
    writer: Mutex<()>,
}

impl<T: Clone + Send + Sync + 'static> SnapshotCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            current: Atomic::new(value),
            writer: Mutex::new(()),
        }
    }

    /// Run `read` against the published value
    pub(crate) fn load<U>(&self, read: impl FnOnce(&T) -> U) -> U {
        let guard = epoch::pin();
        let shared = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: the cell is never null, and a replaced value is only
        // destroyed after every guard pinned before the swap is dropped
        let value = unsafe { shared.deref() };
        read(value)
    }

    /// Publish an edited copy of the value and return what `edit` returned
    pub(crate) fn update<U>(&self, edit: impl FnOnce(&mut T) -> U) -> U {
        let _writer = self.writer.lock();
        let guard = epoch::pin();
        let shared = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: as in `load`; `writer` keeps other writers out
        let mut next = unsafe { shared.deref() }.clone();
        let result = edit(&mut next);
        let previous = self.current.swap(Owned::new(next), Ordering::AcqRel, &guard);
        // SAFETY: `previous` is no longer reachable through the cell; readers
        // that loaded it hold guards that keep it alive
        unsafe { guard.defer_destroy(previous) };
        result
    }
}

impl<T> Drop for SnapshotCell<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent readers and writers
        unsafe {
            let current = self.current.load(Ordering::Relaxed, epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load(|value| f.debug_tuple("SnapshotCell").field(value).finish())
    }
}
