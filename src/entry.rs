//! Filepath: src/entry.rs
//!
//! Stored entries and their payload locks.
//!
//! An [`Entry<V>`] is a cheap, cloneable handle to one stored payload plus the
//! mutex that serializes access to it. The tree owns one handle per stored
//! key; callers receive clones from lookups.
//!
//! # Lock Hand-off
//!
//! Tree operations may acquire an entry's payload lock while they still hold
//! the structural lock, then release the structural lock and hand the payload
//! lock to the caller as an [`EntryGuard<V>`]. The guard owns its share of the
//! entry, so it can outlive the tree borrow that produced it.
//!
//! ```rust
//! use rbindex::{LockMode, RbTree};
//!
//! let tree: RbTree<u32> = RbTree::new();
//! tree.insert(7, 1, LockMode::None);
//!
//! let mut guard = tree.search(7, LockMode::Blocking).unwrap().into_guard().unwrap();
//! *guard += 1;
//! guard.unlock();
//!
//! let entry = tree.search(7, LockMode::None).unwrap().into_entry();
//! assert_eq!(*entry.lock(), 2);
//! ```
//!
//! The mutex is not reentrant: locking an entry twice from the same thread
//! deadlocks. A guard holder must also stay out of the tree until it
//! releases the guard; see the locking notes on [`crate::RbTree`].

use std::fmt as StdFmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::tree::TreeError;

// ============================================================================
//  LockMode
// ============================================================================

/// Payload-lock behavior requested by a tree operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockMode {
    /// Return the entry without touching its lock.
    #[default]
    None,

    /// Block until the entry's lock is held, then hand it to the caller.
    Blocking,

    /// Attempt the entry's lock once without blocking.
    Try,
}

// ============================================================================
//  Entry
// ============================================================================

/// Handle to one stored payload and its dedicated lock.
///
/// Clones share the same payload and lock. The key is fixed for the lifetime
/// of the entry, even when the tree relocates it between nodes.
pub struct Entry<V> {
    key: i64,
    slot: Arc<Mutex<V>>,
}

impl<V> Entry<V> {
    pub(crate) fn new(key: i64, payload: V) -> Self {
        Self {
            key,
            slot: Arc::new(Mutex::new(payload)),
        }
    }

    /// The key this entry is stored under.
    #[must_use]
    #[inline]
    pub const fn key(&self) -> i64 {
        self.key
    }

    /// Block until this thread holds the payload lock.
    #[inline]
    pub fn lock(&self) -> EntryGuard<V> {
        EntryGuard {
            key: self.key,
            inner: self.slot.lock_arc(),
        }
    }

    /// Attempt the payload lock without blocking.
    ///
    /// Returns `None` if another thread holds it.
    #[must_use]
    #[inline]
    pub fn try_lock(&self) -> Option<EntryGuard<V>> {
        self.slot.try_lock_arc().map(|inner| EntryGuard {
            key: self.key,
            inner,
        })
    }

    /// Whether some thread currently holds the payload lock.
    ///
    /// Racy by nature; only useful for diagnostics and tests.
    #[must_use]
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.slot.is_locked()
    }

    /// Whether two handles refer to the same stored entry.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Number of live handles (tree-owned one included, if still stored).
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.slot)
    }

    /// Recover the payload if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if other handles (or guards) still exist.
    pub fn into_payload(self) -> Result<V, Self> {
        let key = self.key;
        Arc::try_unwrap(self.slot)
            .map(Mutex::into_inner)
            .map_err(|slot| Self { key, slot })
    }

    /// Block on the lock and immediately release it.
    ///
    /// Used before an entry leaves the tree so that no thread is mid-access
    /// on it when the tree lets go.
    #[inline]
    pub(crate) fn drain(&self) {
        drop(self.slot.lock());
    }
}

impl<V> Clone for Entry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V> StdFmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  EntryGuard
// ============================================================================

/// Proof that the payload lock of one entry is held.
///
/// Dereferences to the payload. The lock is released by [`EntryGuard::unlock`]
/// or when the guard drops.
#[must_use = "dropping the guard releases the payload lock immediately"]
pub struct EntryGuard<V> {
    key: i64,
    inner: ArcMutexGuard<RawMutex, V>,
}

impl<V> EntryGuard<V> {
    /// Key of the locked entry.
    #[must_use]
    #[inline]
    pub const fn key(&self) -> i64 {
        self.key
    }

    /// A fresh unlocked handle to the same entry.
    #[must_use]
    pub fn entry(&self) -> Entry<V> {
        Entry {
            key: self.key,
            slot: Arc::clone(ArcMutexGuard::mutex(&self.inner)),
        }
    }

    /// Replace the payload, returning the previous one.
    #[inline]
    pub fn replace(&mut self, payload: V) -> V {
        std::mem::replace(&mut *self.inner, payload)
    }

    /// Release the payload lock.
    #[inline]
    pub fn unlock(self) {
        drop(self);
    }
}

impl<V> Deref for EntryGuard<V> {
    type Target = V;

    #[inline]
    fn deref(&self) -> &V {
        &self.inner
    }
}

impl<V> DerefMut for EntryGuard<V> {
    #[inline]
    fn deref_mut(&mut self) -> &mut V {
        &mut self.inner
    }
}

impl<V: StdFmt::Debug> StdFmt::Debug for EntryGuard<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("EntryGuard")
            .field("key", &self.key)
            .field("payload", &*self.inner)
            .finish()
    }
}

// ============================================================================
//  Access
// ============================================================================

/// What a lookup hands back, depending on the requested [`LockMode`].
#[derive(Debug)]
pub enum Access<V> {
    /// Found; the lock was not requested.
    Unlocked(Entry<V>),

    /// Found and locked; the caller now holds the payload lock.
    Locked(EntryGuard<V>),

    /// Found, but a [`LockMode::Try`] attempt hit a held lock.
    Contended(Entry<V>),
}

impl<V> Access<V> {
    /// Resolve `mode` against `entry`. Caller holds the structural lock.
    pub(crate) fn acquire(entry: &Entry<V>, mode: LockMode) -> Self {
        match mode {
            LockMode::None => Self::Unlocked(entry.clone()),
            LockMode::Blocking => Self::Locked(entry.lock()),
            LockMode::Try => entry
                .try_lock()
                .map_or_else(|| Self::Contended(entry.clone()), Self::Locked),
        }
    }

    /// Key of the entry reached.
    #[must_use]
    pub fn key(&self) -> i64 {
        match self {
            Self::Unlocked(entry) | Self::Contended(entry) => entry.key(),
            Self::Locked(guard) => guard.key(),
        }
    }

    /// Whether the caller holds the payload lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }

    /// Whether a try-lock attempt failed.
    #[must_use]
    pub const fn is_contended(&self) -> bool {
        matches!(self, Self::Contended(_))
    }

    /// The held guard, if any. A non-locked result is dropped.
    #[must_use]
    pub fn into_guard(self) -> Option<EntryGuard<V>> {
        match self {
            Self::Locked(guard) => Some(guard),
            Self::Unlocked(_) | Self::Contended(_) => None,
        }
    }

    /// The held guard, or [`TreeError::LockUnavailable`] if the caller does
    /// not hold the payload lock.
    ///
    /// # Errors
    ///
    /// Fails for [`Access::Unlocked`] and [`Access::Contended`].
    pub fn into_locked(self) -> Result<EntryGuard<V>, TreeError> {
        match self {
            Self::Locked(guard) => Ok(guard),
            Self::Unlocked(entry) | Self::Contended(entry) => {
                Err(TreeError::LockUnavailable { key: entry.key() })
            }
        }
    }

    /// An unlocked handle. A held guard is released first.
    #[must_use]
    pub fn into_entry(self) -> Entry<V> {
        match self {
            Self::Unlocked(entry) | Self::Contended(entry) => entry,
            Self::Locked(guard) => guard.entry(),
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn _assert_send_sync()
    where
        Entry<u64>: Send + Sync,
    {
    }

    #[test]
    fn test_lock_then_try_lock_fails() {
        let entry = Entry::new(3, String::from("a"));
        let guard = entry.lock();

        assert!(entry.is_locked());
        assert!(entry.try_lock().is_none());

        guard.unlock();
        assert!(!entry.is_locked());
        assert!(entry.try_lock().is_some());
    }

    #[test]
    fn test_guard_mutation_visible_to_clones() {
        let entry = Entry::new(1, 10_u32);
        let other = entry.clone();

        *entry.lock() += 5;

        assert_eq!(*other.lock(), 15);
        assert!(entry.ptr_eq(&other));
    }

    #[test]
    fn test_guard_replace_returns_previous() {
        let entry = Entry::new(1, "old");
        let mut guard = entry.lock();

        assert_eq!(guard.replace("new"), "old");
        assert_eq!(*guard, "new");
    }

    #[test]
    fn test_guard_entry_is_same_entry() {
        let entry = Entry::new(9, 0_u8);
        let guard = entry.lock();
        let again = guard.entry();

        assert_eq!(again.key(), 9);
        assert!(again.ptr_eq(&entry));
    }

    #[test]
    fn test_into_payload_requires_last_handle() {
        let entry = Entry::new(2, vec![1, 2, 3]);
        let clone = entry.clone();

        let entry = entry.into_payload().unwrap_err();
        drop(clone);

        assert_eq!(entry.into_payload().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_access_try_mode_reports_contention() {
        let entry = Entry::new(4, ());
        let held = entry.lock();

        let access = Access::acquire(&entry, LockMode::Try);
        assert!(access.is_contended());
        assert_eq!(access.key(), 4);

        assert_eq!(
            access.into_locked().unwrap_err(),
            TreeError::LockUnavailable { key: 4 }
        );

        drop(held);
        let access = Access::acquire(&entry, LockMode::Try);
        assert!(access.is_locked());
        assert_eq!(access.into_locked().unwrap().key(), 4);
    }

    #[test]
    fn test_access_into_entry_releases_lock() {
        let entry = Entry::new(5, ());
        let access = Access::acquire(&entry, LockMode::Blocking);
        assert!(entry.is_locked());

        let handle = access.into_entry();
        assert!(!handle.is_locked());
    }

    #[test]
    fn test_drain_waits_for_holder() {
        let entry = Entry::new(6, 0_u64);
        let released = std::sync::Arc::new(AtomicBool::new(false));

        let guard = entry.lock();
        let drainer = {
            let entry = entry.clone();
            let released = std::sync::Arc::clone(&released);
            thread::spawn(move || {
                entry.drain();
                assert!(released.load(Ordering::Acquire));
            })
        };

        thread::sleep(Duration::from_millis(20));
        released.store(true, Ordering::Release);
        drop(guard);

        drainer.join().unwrap();
    }
}
