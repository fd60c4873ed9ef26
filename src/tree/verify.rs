//! Red-black invariant checking.
//!
//! [`Arena::check`] walks the whole tree and reports the first broken rule.
//! It is O(n) and intended for tests, the stress binary, and debugging; the
//! engine itself never calls it on the hot path.

use std::fmt as StdFmt;

use super::arena::{Arena, NIL, NodeId};

/// A broken red-black or bookkeeping invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The root is RED.
    RedRoot {
        /// Key at the root.
        key: i64,
    },

    /// The shared sentinel is RED.
    RedSentinel,

    /// A RED node has a RED child.
    RedRedEdge {
        /// Key of the RED parent.
        parent: i64,
        /// Key of the RED child.
        child: i64,
    },

    /// Two paths below `key` pass through different numbers of BLACK nodes.
    BlackHeightMismatch {
        /// Key of the node whose subtrees disagree.
        key: i64,
        /// Black height of the left subtree.
        left: usize,
        /// Black height of the right subtree.
        right: usize,
    },

    /// In-order traversal is not strictly ascending.
    OrderViolation {
        /// The earlier key in traversal order.
        prev: i64,
        /// The key that did not exceed it.
        next: i64,
    },

    /// A child's parent link does not point back at its parent.
    ParentLinkMismatch {
        /// Key of the child.
        key: i64,
    },

    /// A live node carries no entry, or an entry stored under a different key.
    EntryMismatch {
        /// Key of the node.
        key: i64,
    },

    /// The live-entry count disagrees with the reachable node count.
    CountMismatch {
        /// The recorded count.
        recorded: usize,
        /// Nodes actually reachable from the root.
        reachable: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::RedRoot { key } => write!(f, "root {key} is red"),

            Self::RedSentinel => write!(f, "sentinel is red"),

            Self::RedRedEdge { parent, child } => {
                write!(f, "red node {parent} has red child {child}")
            }

            Self::BlackHeightMismatch { key, left, right } => {
                write!(f, "black height below {key} differs: left {left}, right {right}")
            }

            Self::OrderViolation { prev, next } => {
                write!(f, "in-order keys not ascending: {prev} then {next}")
            }

            Self::ParentLinkMismatch { key } => write!(f, "parent link of {key} is inconsistent"),

            Self::EntryMismatch { key } => write!(f, "node {key} does not own a matching entry"),

            Self::CountMismatch {
                recorded,
                reachable,
            } => {
                write!(f, "count is {recorded} but {reachable} nodes are reachable")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

impl<V> Arena<V> {
    /// Check every invariant; returns the black height of the root.
    pub(crate) fn check(&self, recorded: usize) -> Result<usize, InvariantViolation> {
        if self.is_red(NIL) {
            return Err(InvariantViolation::RedSentinel);
        }
        if self.root != NIL {
            if self.is_red(self.root) {
                return Err(InvariantViolation::RedRoot {
                    key: self.key(self.root),
                });
            }
            if self.parent(self.root) != NIL {
                return Err(InvariantViolation::ParentLinkMismatch {
                    key: self.key(self.root),
                });
            }
        }

        let height = self.check_subtree(self.root)?;

        let mut reachable = 0_usize;
        let mut prev: Option<i64> = None;
        for id in self.in_order() {
            let key = self.key(id);
            if let Some(prev) = prev
                && prev >= key
            {
                return Err(InvariantViolation::OrderViolation { prev, next: key });
            }
            prev = Some(key);
            reachable += 1;
        }

        if reachable != recorded {
            return Err(InvariantViolation::CountMismatch {
                recorded,
                reachable,
            });
        }
        Ok(height)
    }

    /// Black height of the subtree at `x` (sentinel counts as 0).
    fn check_subtree(&self, x: NodeId) -> Result<usize, InvariantViolation> {
        if x == NIL {
            return Ok(0);
        }

        let key = self.key(x);
        if self.node(x).entry.as_ref().is_none_or(|e| e.key() != key) {
            return Err(InvariantViolation::EntryMismatch { key });
        }

        let (left, right) = (self.left(x), self.right(x));
        for child in [left, right] {
            if child == NIL {
                continue;
            }
            if self.parent(child) != x {
                return Err(InvariantViolation::ParentLinkMismatch {
                    key: self.key(child),
                });
            }
            if self.is_red(x) && self.is_red(child) {
                return Err(InvariantViolation::RedRedEdge {
                    parent: key,
                    child: self.key(child),
                });
            }
        }

        let lh = self.check_subtree(left)?;
        let rh = self.check_subtree(right)?;
        if lh != rh {
            return Err(InvariantViolation::BlackHeightMismatch {
                key,
                left: lh,
                right: rh,
            });
        }
        Ok(lh + usize::from(self.is_black(x)))
    }
}
