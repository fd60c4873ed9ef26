//! # `rbindex`
//!
//! A concurrent ordered index: a red-black tree over `i64` keys whose entries
//! can be searched, inserted, removed, and reached by rank while many threads
//! use the tree at once.
//!
//! ## Locking Model
//!
//! | Tier | Primitive | Guards | Taken by |
//! |------|-----------|--------|----------|
//! | Structural | one `parking_lot::RwLock` per tree | links, colors, count | every tree operation |
//! | Payload | one `parking_lot::Mutex` per entry | the stored value | callers, via [`LockMode`] |
//!
//! The structural lock is always taken first. A payload lock requested
//! through [`LockMode::Blocking`] or [`LockMode::Try`] is acquired before the
//! structural lock is released and handed to the caller as an
//! [`EntryGuard`], so a caller can keep working on one payload while other
//! threads restructure the tree around it.
//!
//! The order is never reversed: while a thread holds an [`EntryGuard`] it
//! must not call into the same tree, for any key. A writer parked on that
//! payload holds the structural lock, so the guard holder's call would never
//! return. Release the guard first.
//!
//! ```rust
//! use rbindex::{LockMode, RbTree};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let tree: Arc<RbTree<Vec<u8>>> = Arc::new(RbTree::new());
//! tree.insert(1, Vec::new(), LockMode::None);
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             let mut guard = tree.search(1, LockMode::Blocking).unwrap().into_guard().unwrap();
//!             guard.push(t);
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! let entry = tree.search(1, LockMode::None).unwrap().into_entry();
//! assert_eq!(entry.lock().len(), 4);
//! ```
//!
//! ## Costs
//!
//! - `search`, `insert`, `remove`, `take`, `next`: O(log n) structural work.
//! - `value_at`: O(n); it walks successors from the minimum.
//! - Blocking calls have no timeout.
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events for structural changes and lock
//!   contention. Off by default; without it logging compiles away.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod entry;
pub mod tree;

mod tracing_helpers;

pub use entry::{Access, Entry, EntryGuard, LockMode};
pub use tree::{CollisionError, InsertOutcome, InvariantViolation, RbTree, TreeError};
