//! Filepath: src/tree.rs
//! `RbTree` - a concurrent red-black index over `i64` keys.
//!
//! # Locking
//!
//! Two tiers, always taken in this order:
//!
//! 1. One structural [`RwLock`] per tree. Lookups (`search`, `value_at`,
//!    `next`, `first`, `last`, `keys`) take it shared; `insert`, `remove`,
//!    `take` and `clear` take it exclusive for the whole descent and
//!    rebalance.
//! 2. One payload mutex per [`Entry`]. Operations given a locking
//!    [`LockMode`] acquire it before the structural lock is released and
//!    hand it to the caller as an [`EntryGuard`].
//!
//! A thread holding an [`EntryGuard`] must not call into the same tree at
//! all, for any key, until the guard is released. A colliding `insert`, or
//! a `remove`/`take`/`clear` reaching that entry, parks on the payload lock
//! while holding the structural write lock; any structural call from the
//! guard holder then waits on the write lock, and neither side can proceed.
//! Copy what is needed out of the payload, release the guard, then go back
//! to the tree. Blocking calls have no timeout; build bounded waits over
//! [`LockMode::Try`].

use std::fmt as StdFmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::entry::{Access, Entry, EntryGuard, LockMode};
use crate::tracing_helpers::{debug_log, trace_log};

mod arena;
mod balance;
mod verify;


use arena::{Arena, NIL, NodeId};
use balance::Slot;

pub use verify::InvariantViolation;

// ============================================================================
//  TreeError
// ============================================================================

/// Recoverable outcomes of tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// No entry is stored under `key`.
    NotFound {
        /// The key looked up.
        key: i64,
    },

    /// `rank` is outside `[0, len)`.
    OutOfRange {
        /// The requested rank.
        rank: usize,
        /// Number of entries at the time of the call.
        len: usize,
    },

    /// The entry exists but its payload lock is not held by the caller.
    LockUnavailable {
        /// Key of the contended entry.
        key: i64,
    },

    /// `insert_try` collided with an entry whose lock was held; the new
    /// payload was rejected.
    CollisionLockUnavailable {
        /// The colliding key.
        key: i64,
    },
}

impl StdFmt::Display for TreeError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key {key} not found"),

            Self::OutOfRange { rank, len } => {
                write!(f, "rank {rank} out of range for {len} entries")
            }

            Self::LockUnavailable { key } => write!(f, "payload lock of key {key} unavailable"),

            Self::CollisionLockUnavailable { key } => {
                write!(f, "key {key} exists and its payload lock is held; payload rejected")
            }
        }
    }
}

impl std::error::Error for TreeError {}

/// `insert_try` rejection, carrying the payload back to the caller.
///
/// Dropping it discards the payload.
pub struct CollisionError<V> {
    /// The colliding key.
    pub key: i64,
    /// The payload that was not stored.
    pub payload: V,
}

impl<V> CollisionError<V> {
    /// Take back the rejected payload.
    pub fn into_payload(self) -> V {
        self.payload
    }
}

impl<V> StdFmt::Debug for CollisionError<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("CollisionError")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<V> StdFmt::Display for CollisionError<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        StdFmt::Display::fmt(&TreeError::CollisionLockUnavailable { key: self.key }, f)
    }
}

impl<V> std::error::Error for CollisionError<V> {}

impl<V> From<CollisionError<V>> for TreeError {
    fn from(err: CollisionError<V>) -> Self {
        Self::CollisionLockUnavailable { key: err.key }
    }
}

// ============================================================================
//  InsertOutcome
// ============================================================================

/// Result of a successful insert.
#[derive(Debug)]
pub enum InsertOutcome<V> {
    /// The key was new.
    Inserted(Access<V>),

    /// The key existed; its payload was swapped under the entry's lock.
    Replaced {
        /// The entry now holding the new payload.
        access: Access<V>,
        /// The payload that was displaced. Dropping it releases it.
        previous: V,
    },
}

impl<V> InsertOutcome<V> {
    /// Whether the key already existed.
    #[must_use]
    pub const fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }

    /// The access to the stored entry, discarding any previous payload.
    #[must_use]
    pub fn into_access(self) -> Access<V> {
        match self {
            Self::Inserted(access) | Self::Replaced { access, .. } => access,
        }
    }

    /// The displaced payload, if any.
    #[must_use]
    pub fn into_previous(self) -> Option<V> {
        match self {
            Self::Inserted(_) => None,
            Self::Replaced { previous, .. } => Some(previous),
        }
    }
}

// ============================================================================
//  RbTree
// ============================================================================

/// A red-black tree of [`Entry`] values keyed by `i64`, safe to share
/// between threads.
///
/// `RbTree<V>` is `Send + Sync` when `V: Send`. Share it with `Arc` or
/// scoped threads.
///
/// # Example
///
/// ```rust
/// use rbindex::{LockMode, RbTree};
///
/// let tree: RbTree<&str> = RbTree::new();
/// tree.insert(20, "b", LockMode::None);
/// tree.insert(10, "a", LockMode::None);
///
/// assert_eq!(tree.len(), 2);
/// assert_eq!(tree.value_at(0, LockMode::None).unwrap().key(), 10);
///
/// tree.remove(10).unwrap();
/// assert!(tree.search(10, LockMode::None).is_err());
/// ```
pub struct RbTree<V> {
    state: RwLock<Arena<V>>,

    /// Mirrors the number of live nodes. Written only under the write lock.
    count: AtomicUsize,
}

impl<V> StdFmt::Debug for RbTree<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("RbTree")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<V> Default for RbTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RbTree<V> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty tree with room for `capacity` nodes before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(Arena::with_capacity(capacity)),
            count: AtomicUsize::new(0),
        }
    }

    /// Number of stored entries.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(AtomicOrdering::Acquire)
    }

    /// Alias of [`RbTree::len`].
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Whether the tree holds no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    //  Lookups
    // ------------------------------------------------------------------------

    /// Resolve a node found under the read lock. Any payload lock is taken
    /// before the structural lock is released.
    fn access_at(state: &Arena<V>, id: NodeId, mode: LockMode) -> Access<V> {
        let access = Access::acquire(state.entry(id), mode);
        if access.is_contended() {
            trace_log!(key = state.key(id), "payload lock contended");
        }
        access
    }

    /// Find the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if the key is absent. A contended
    /// [`LockMode::Try`] is not an error; it yields [`Access::Contended`].
    pub fn search(&self, key: i64, mode: LockMode) -> Result<Access<V>, TreeError> {
        let state = self.state.read();
        match state.find(key) {
            NIL => Err(TreeError::NotFound { key }),
            id => Ok(Self::access_at(&state, id, mode)),
        }
    }

    /// Whether `key` is stored.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.state.read().find(key) != NIL
    }

    /// The entry at 0-based ascending `rank`.
    ///
    /// Walks from the minimum, so each call is O(n).
    ///
    /// # Errors
    ///
    /// [`TreeError::OutOfRange`] if `rank >= len`.
    pub fn value_at(&self, rank: usize, mode: LockMode) -> Result<Access<V>, TreeError> {
        let state = self.state.read();
        let len = self.len();
        if rank >= len {
            return Err(TreeError::OutOfRange { rank, len });
        }
        let id = state.nth(rank);
        debug_assert_ne!(id, NIL, "rank below count walked off the tree");
        Ok(Self::access_at(&state, id, mode))
    }

    /// The entry with the smallest key strictly greater than `key`.
    ///
    /// `key` itself need not be stored.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] (carrying `key`) when nothing follows it.
    pub fn next(&self, key: i64, mode: LockMode) -> Result<Access<V>, TreeError> {
        let state = self.state.read();
        match state.upper_bound(key) {
            NIL => Err(TreeError::NotFound { key }),
            id => Ok(Self::access_at(&state, id, mode)),
        }
    }

    /// The entry with the smallest key, if any.
    #[must_use]
    pub fn first(&self, mode: LockMode) -> Option<Access<V>> {
        let state = self.state.read();
        match state.minimum(state.root) {
            NIL => None,
            id => Some(Self::access_at(&state, id, mode)),
        }
    }

    /// The entry with the largest key, if any.
    #[must_use]
    pub fn last(&self, mode: LockMode) -> Option<Access<V>> {
        let state = self.state.read();
        match state.maximum(state.root) {
            NIL => None,
            id => Some(Self::access_at(&state, id, mode)),
        }
    }

    /// All keys in ascending order, read under one structural lock.
    #[must_use]
    pub fn keys(&self) -> Vec<i64> {
        let state = self.state.read();
        state.in_order().map(|id| state.key(id)).collect()
    }

    // ------------------------------------------------------------------------
    //  Mutation
    // ------------------------------------------------------------------------

    /// Insert `payload` under `key`.
    ///
    /// On a new key the entry is created and linked. On an existing key the
    /// entry's payload lock is acquired (blocking), the payload is swapped
    /// and the old one is returned in [`InsertOutcome::Replaced`].
    ///
    /// With a locking `mode` the entry's lock stays held in the returned
    /// [`Access`]; a fresh entry is unshared, so [`LockMode::Try`] always
    /// succeeds.
    pub fn insert(&self, key: i64, payload: V, mode: LockMode) -> InsertOutcome<V> {
        let mut state = self.state.write();
        match state.locate(key) {
            Slot::Vacant(parent) => self.link_new(&mut state, parent, key, payload, mode),
            Slot::Occupied(id) => {
                let entry = state.entry(id).clone();
                let guard = entry.lock();
                Self::swap_payload(entry, guard, payload, mode)
            }
        }
    }

    /// Like [`RbTree::insert`], but a collision only tries the existing
    /// entry's lock.
    ///
    /// # Errors
    ///
    /// [`CollisionError`] with the rejected payload when the key exists and
    /// its lock is held elsewhere. The stored payload is untouched.
    pub fn insert_try(
        &self,
        key: i64,
        payload: V,
        mode: LockMode,
    ) -> Result<InsertOutcome<V>, CollisionError<V>> {
        let mut state = self.state.write();
        match state.locate(key) {
            Slot::Vacant(parent) => Ok(self.link_new(&mut state, parent, key, payload, mode)),
            Slot::Occupied(id) => {
                let entry = state.entry(id).clone();
                let Some(guard) = entry.try_lock() else {
                    trace_log!(key, "insert_try rejected: payload lock held");
                    return Err(CollisionError { key, payload });
                };
                Ok(Self::swap_payload(entry, guard, payload, mode))
            }
        }
    }

    fn link_new(
        &self,
        state: &mut Arena<V>,
        parent: NodeId,
        key: i64,
        payload: V,
        mode: LockMode,
    ) -> InsertOutcome<V> {
        let entry = Entry::new(key, payload);
        let access = Access::acquire(&entry, mode);
        state.link(parent, key, entry);
        self.count.fetch_add(1, AtomicOrdering::Release);
        debug_log!(key, len = self.len(), "inserted");
        InsertOutcome::Inserted(access)
    }

    fn swap_payload(
        entry: Entry<V>,
        mut guard: EntryGuard<V>,
        payload: V,
        mode: LockMode,
    ) -> InsertOutcome<V> {
        let previous = guard.replace(payload);
        debug_log!(key = entry.key(), "replaced");
        let access = match mode {
            LockMode::None => {
                guard.unlock();
                Access::Unlocked(entry)
            }
            LockMode::Blocking | LockMode::Try => Access::Locked(guard),
        };
        InsertOutcome::Replaced { access, previous }
    }

    /// Unlink `key` and wait out any holder of its payload lock.
    fn detach(&self, key: i64) -> Result<Entry<V>, TreeError> {
        let mut state = self.state.write();
        let id = state.find(key);
        if id == NIL {
            return Err(TreeError::NotFound { key });
        }
        let entry = state
            .unlink(id)
            .ok_or(TreeError::NotFound { key })?;
        self.count.fetch_sub(1, AtomicOrdering::Release);

        trace_log!(key, "draining payload lock");
        entry.drain();
        debug_log!(key, len = self.len(), "removed");
        Ok(entry)
    }

    /// Remove `key`, releasing the tree's hold on its payload.
    ///
    /// Blocks until no thread holds the entry's payload lock. The payload is
    /// dropped here unless a caller still holds an [`Entry`] handle to it.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if the key is absent.
    pub fn remove(&self, key: i64) -> Result<(), TreeError> {
        self.detach(key).map(drop)
    }

    /// Remove `key` and hand its entry to the caller.
    ///
    /// Use [`Entry::into_payload`] to recover the payload by value.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if the key is absent.
    pub fn take(&self, key: i64) -> Result<Entry<V>, TreeError> {
        self.detach(key)
    }

    /// Remove every entry, draining each payload lock in post-order.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.reset(|entry| entry.drain());
        self.count.store(0, AtomicOrdering::Release);
        debug_log!("cleared");
    }

    /// Check every red-black invariant under the read lock.
    ///
    /// Returns the black height of the root (the sentinel counts as 0).
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] found.
    pub fn verify(&self) -> Result<usize, InvariantViolation> {
        let state = self.state.read();
        state.check(self.len())
    }
}

impl<V> Drop for RbTree<V> {
    fn drop(&mut self) {
        // Exclusive access: no lookup or payload hand-off can be in flight.
        let state = self.state.get_mut();
        debug_log!(len = *self.count.get_mut(), "dropping tree");
        state.reset(drop);
    }
}

// ============================================================================
//  Tests
// ============================================================================
