//! Rotations and red-black fixups.
//!
//! All functions here run with the structural write lock held, so a
//! partially rebalanced tree is never observable.

use super::arena::{Arena, Color, NIL, NodeId};
use crate::entry::Entry;

/// Where a key lands in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Key present at this node.
    Occupied(NodeId),

    /// Key absent; a new node would hang off this parent (`NIL` for an empty tree).
    Vacant(NodeId),
}

impl<V> Arena<V> {
    pub(crate) fn locate(&self, key: i64) -> Slot {
        let mut parent = NIL;
        let mut x = self.root;
        while x != NIL {
            parent = x;
            let k = self.key(x);
            if key < k {
                x = self.left(x);
            } else if key > k {
                x = self.right(x);
            } else {
                return Slot::Occupied(x);
            }
        }
        Slot::Vacant(parent)
    }

    // ------------------------------------------------------------------------
    //  Rotations
    // ------------------------------------------------------------------------

    /// Make `parent`'s link that pointed at `old` point at `new`.
    /// A `NIL` parent means `old` was the root.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if parent == NIL {
            self.root = new;
        } else if old == self.left(parent) {
            self.node_mut(parent).left = new;
        } else {
            self.node_mut(parent).right = new;
        }
    }

    pub(crate) fn left_rotate(&mut self, x: NodeId) {
        let y = self.right(x);
        debug_assert_ne!(y, NIL, "left_rotate without right child");

        let y_left = self.left(y);
        self.node_mut(x).right = y_left;
        if y_left != NIL {
            self.node_mut(y_left).parent = x;
        }

        let x_parent = self.parent(x);
        self.node_mut(y).parent = x_parent;
        self.replace_child(x_parent, x, y);

        self.node_mut(y).left = x;
        self.node_mut(x).parent = y;
    }

    pub(crate) fn right_rotate(&mut self, x: NodeId) {
        let y = self.left(x);
        debug_assert_ne!(y, NIL, "right_rotate without left child");

        let y_right = self.right(y);
        self.node_mut(x).left = y_right;
        if y_right != NIL {
            self.node_mut(y_right).parent = x;
        }

        let x_parent = self.parent(x);
        self.node_mut(y).parent = x_parent;
        self.replace_child(x_parent, x, y);

        self.node_mut(y).right = x;
        self.node_mut(x).parent = y;
    }

    // ------------------------------------------------------------------------
    //  Insert
    // ------------------------------------------------------------------------

    /// Hang a new RED node under `parent` (from [`Slot::Vacant`]) and rebalance.
    pub(crate) fn link(&mut self, parent: NodeId, key: i64, entry: Entry<V>) -> NodeId {
        let z = self.alloc(key, entry);
        self.node_mut(z).parent = parent;

        if parent == NIL {
            self.root = z;
        } else if key < self.key(parent) {
            self.node_mut(parent).left = z;
        } else {
            debug_assert!(key > self.key(parent), "duplicate key reached link");
            self.node_mut(parent).right = z;
        }

        self.insert_fixup(z);
        z
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while self.is_red(self.parent(z)) {
            let p = self.parent(z);
            let g = self.parent(p);

            if p == self.left(g) {
                let uncle = self.right(g);
                if self.is_red(uncle) {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.right(p) {
                        z = p;
                        self.left_rotate(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.right_rotate(g);
                }
            } else {
                let uncle = self.left(g);
                if self.is_red(uncle) {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.left(p) {
                        z = p;
                        self.right_rotate(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.left_rotate(g);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    // ------------------------------------------------------------------------
    //  Delete
    // ------------------------------------------------------------------------

    /// Unlink the node `z` and return the entry that was stored at `z`.
    ///
    /// When `z` has two children its in-order successor `y` is spliced out
    /// instead, after `y`'s key and entry move into `z`. Node identity at a
    /// given key is therefore not stable across removals.
    pub(crate) fn unlink(&mut self, z: NodeId) -> Option<Entry<V>> {
        debug_assert_ne!(z, NIL, "unlink called on sentinel");

        let y = if self.left(z) == NIL || self.right(z) == NIL {
            z
        } else {
            self.successor(z)
        };

        let x = if self.left(y) == NIL {
            self.right(y)
        } else {
            self.left(y)
        };

        // x may be the sentinel; its parent link is what delete_fixup climbs.
        let y_parent = self.parent(y);
        self.node_mut(x).parent = y_parent;
        self.replace_child(y_parent, y, x);

        if y != z {
            let z_key = self.key(z);
            let y_key = self.key(y);
            let donated = self.node_mut(y).entry.take();
            let displaced = std::mem::replace(&mut self.node_mut(z).entry, donated);
            self.node_mut(z).key = y_key;
            let y_node = self.node_mut(y);
            y_node.key = z_key;
            y_node.entry = displaced;
        }

        if self.is_black(y) {
            self.delete_fixup(x);
        }

        let entry = self.release(y);
        self.node_mut(NIL).parent = NIL;
        entry
    }

    fn delete_fixup(&mut self, mut x: NodeId) {
        while x != self.root && self.is_black(x) {
            let p = self.parent(x);

            if x == self.left(p) {
                let mut w = self.right(p);
                debug_assert_ne!(w, NIL, "double-black node without sibling");
                if self.is_red(w) {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.left_rotate(p);
                    w = self.right(self.parent(x));
                }
                if self.is_black(self.left(w)) && self.is_black(self.right(w)) {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    if self.is_black(self.right(w)) {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.right_rotate(w);
                        w = self.right(self.parent(x));
                    }
                    let p = self.parent(x);
                    self.set_color(w, self.color(p));
                    self.set_color(p, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.left_rotate(p);
                    x = self.root;
                }
            } else {
                let mut w = self.left(p);
                debug_assert_ne!(w, NIL, "double-black node without sibling");
                if self.is_red(w) {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.right_rotate(p);
                    w = self.left(self.parent(x));
                }
                if self.is_black(self.right(w)) && self.is_black(self.left(w)) {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    if self.is_black(self.left(w)) {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.left_rotate(w);
                        w = self.left(self.parent(x));
                    }
                    let p = self.parent(x);
                    self.set_color(w, self.color(p));
                    self.set_color(p, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.right_rotate(p);
                    x = self.root;
                }
            }
        }
        self.set_color(x, Color::Black);
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;

    fn insert(arena: &mut Arena<i64>, key: i64) {
        match arena.locate(key) {
            Slot::Vacant(parent) => {
                arena.link(parent, key, Entry::new(key, key));
            }
            Slot::Occupied(_) => panic!("duplicate {key}"),
        }
    }

    fn keys(arena: &Arena<i64>) -> Vec<i64> {
        arena.in_order().map(|id| arena.key(id)).collect()
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut arena = Arena::with_capacity(64);
        for (n, k) in (0..64).enumerate() {
            insert(&mut arena, k);
            arena.check(n + 1).unwrap();
        }

        assert_eq!(keys(&arena), (0..64).collect::<Vec<_>>());
        assert!(arena.is_black(arena.root));
    }

    #[test]
    fn test_left_rotate_relinks_root() {
        let mut arena = Arena::with_capacity(3);
        let a = arena.alloc(1, Entry::new(1, 1));
        let b = arena.alloc(2, Entry::new(2, 2));
        arena.root = a;
        arena.node_mut(a).right = b;
        arena.node_mut(b).parent = a;

        arena.left_rotate(a);

        assert_eq!(arena.root, b);
        assert_eq!(arena.left(b), a);
        assert_eq!(arena.parent(a), b);
        assert_eq!(arena.parent(b), NIL);
        assert_eq!(arena.right(a), NIL);
    }

    #[test]
    fn test_unlink_two_children_donates_successor() {
        let mut arena = Arena::with_capacity(8);
        for k in [20, 10, 30, 25, 35] {
            insert(&mut arena, k);
        }
        let target = arena.find(30);

        let removed = arena.unlink(target).unwrap();

        assert_eq!(removed.key(), 30);
        assert_eq!(*removed.lock(), 30);
        // the surviving node at the old position now carries the successor
        assert_eq!(arena.key(target), 35);
        assert_eq!(arena.entry(target).key(), 35);
        assert_eq!(keys(&arena), vec![10, 20, 25, 35]);
        arena.check(4).unwrap();
    }

    #[test]
    fn test_unlink_everything_in_mixed_order() {
        let mut arena = Arena::with_capacity(32);
        let order: Vec<i64> = (0..32).map(|i| (i * 13) % 32).collect();
        for &k in &order {
            insert(&mut arena, k);
        }

        for (n, &k) in order.iter().rev().enumerate() {
            let id = arena.find(k);
            assert_ne!(id, NIL);
            assert_eq!(arena.unlink(id).unwrap().key(), k);
            arena.check(31 - n).unwrap();
        }
        assert_eq!(arena.root, NIL);
    }
}
