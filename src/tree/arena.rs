//! Node storage for the red-black tree.
//!
//! Nodes live in a `Vec` and link to each other by [`NodeId`]. Slot 0 is the
//! shared sentinel: every leaf link and the root's parent link point at it,
//! so the balancing code never checks for a missing child. Freed slots are
//! recycled through a LIFO free list.

use crate::entry::Entry;

// ============================================================================
//  NodeId / Color
// ============================================================================

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

/// The shared sentinel.
pub(crate) const NIL: NodeId = NodeId(0);

impl NodeId {
    #[inline(always)]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

// ============================================================================
//  Node
// ============================================================================

#[derive(Debug)]
pub(crate) struct Node<V> {
    pub(crate) key: i64,
    pub(crate) color: Color,
    pub(crate) parent: NodeId,
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
    /// `None` only for the sentinel and for slots on the free list.
    pub(crate) entry: Option<Entry<V>>,
}

impl<V> Node<V> {
    const fn sentinel() -> Self {
        Self {
            key: 0,
            color: Color::Black,
            parent: NIL,
            left: NIL,
            right: NIL,
            entry: None,
        }
    }
}

// ============================================================================
//  Arena
// ============================================================================

/// All structural state of one tree. Guarded as a whole by the tree's rwlock.
#[derive(Debug)]
pub(crate) struct Arena<V> {
    nodes: Vec<Node<V>>,
    free: Vec<NodeId>,
    pub(crate) root: NodeId,
}

impl<V> Arena<V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.saturating_add(1));
        nodes.push(Node::sentinel());
        Self {
            nodes,
            free: Vec::new(),
            root: NIL,
        }
    }

    #[inline(always)]
    pub(crate) fn node(&self, id: NodeId) -> &Node<V> {
        &self.nodes[id.index()]
    }

    #[inline(always)]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<V> {
        &mut self.nodes[id.index()]
    }

    #[inline(always)]
    pub(crate) fn key(&self, id: NodeId) -> i64 {
        self.node(id).key
    }

    #[inline(always)]
    pub(crate) fn color(&self, id: NodeId) -> Color {
        self.node(id).color
    }

    #[inline(always)]
    pub(crate) fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).color = color;
    }

    #[inline(always)]
    pub(crate) fn is_red(&self, id: NodeId) -> bool {
        self.color(id) == Color::Red
    }

    #[inline(always)]
    pub(crate) fn is_black(&self, id: NodeId) -> bool {
        self.color(id) == Color::Black
    }

    #[inline(always)]
    pub(crate) fn parent(&self, id: NodeId) -> NodeId {
        self.node(id).parent
    }

    #[inline(always)]
    pub(crate) fn left(&self, id: NodeId) -> NodeId {
        self.node(id).left
    }

    #[inline(always)]
    pub(crate) fn right(&self, id: NodeId) -> NodeId {
        self.node(id).right
    }

    /// Entry of a live node.
    ///
    /// # Panics
    /// Panics if `id` is the sentinel or a freed slot.
    #[expect(clippy::expect_used, reason = "Invariant ensured by caller")]
    pub(crate) fn entry(&self, id: NodeId) -> &Entry<V> {
        self.node(id)
            .entry
            .as_ref()
            .expect("Arena::entry called on sentinel or freed node")
    }

    /// Allocate a detached RED node owning `entry`.
    ///
    /// # Panics
    /// Panics once `u32::MAX` slots are in use.
    #[expect(clippy::expect_used, reason = "NodeId space exhaustion is unrecoverable")]
    pub(crate) fn alloc(&mut self, key: i64, entry: Entry<V>) -> NodeId {
        let node = Node {
            key,
            color: Color::Red,
            parent: NIL,
            left: NIL,
            right: NIL,
            entry: Some(entry),
        };

        if let Some(id) = self.free.pop() {
            *self.node_mut(id) = node;
            return id;
        }

        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena exhausted"));
        self.nodes.push(node);
        id
    }

    /// Return an unlinked node's slot to the free list, yielding its entry.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Entry<V>> {
        debug_assert_ne!(id, NIL, "sentinel is never released");
        let node = self.node_mut(id);
        node.parent = NIL;
        node.left = NIL;
        node.right = NIL;
        let entry = node.entry.take();
        self.free.push(id);
        entry
    }

    /// Drop every node and reset to the empty tree, keeping the allocation.
    ///
    /// Entries are handed to `on_release` in post-order.
    pub(crate) fn reset(&mut self, mut on_release: impl FnMut(Entry<V>)) {
        let mut stack = Vec::new();
        let mut last = NIL;
        let mut cur = self.root;

        while cur != NIL || !stack.is_empty() {
            if cur != NIL {
                stack.push(cur);
                cur = self.left(cur);
                continue;
            }

            let Some(&top) = stack.last() else { break };
            let right = self.right(top);
            if right != NIL && right != last {
                cur = right;
            } else {
                stack.pop();
                if let Some(entry) = self.node_mut(top).entry.take() {
                    on_release(entry);
                }
                last = top;
            }
        }

        self.nodes.truncate(1);
        self.nodes[0] = Node::sentinel();
        self.free.clear();
        self.root = NIL;
    }

    // ------------------------------------------------------------------------
    //  Traversal
    // ------------------------------------------------------------------------

    /// Descend from the root; `NIL` on miss.
    pub(crate) fn find(&self, key: i64) -> NodeId {
        let mut x = self.root;
        while x != NIL {
            let k = self.key(x);
            if key < k {
                x = self.left(x);
            } else if key > k {
                x = self.right(x);
            } else {
                return x;
            }
        }
        NIL
    }

    pub(crate) fn minimum(&self, mut x: NodeId) -> NodeId {
        if x == NIL {
            return NIL;
        }
        while self.left(x) != NIL {
            x = self.left(x);
        }
        x
    }

    pub(crate) fn maximum(&self, mut x: NodeId) -> NodeId {
        if x == NIL {
            return NIL;
        }
        while self.right(x) != NIL {
            x = self.right(x);
        }
        x
    }

    /// In-order successor; `NIL` past the maximum.
    pub(crate) fn successor(&self, mut x: NodeId) -> NodeId {
        if self.right(x) != NIL {
            return self.minimum(self.right(x));
        }
        let mut y = self.parent(x);
        while y != NIL && x == self.right(y) {
            x = y;
            y = self.parent(y);
        }
        y
    }

    /// Node with the smallest key strictly greater than `key`.
    pub(crate) fn upper_bound(&self, key: i64) -> NodeId {
        let mut x = self.root;
        let mut best = NIL;
        while x != NIL {
            if self.key(x) > key {
                best = x;
                x = self.left(x);
            } else {
                x = self.right(x);
            }
        }
        best
    }

    /// Node at 0-based ascending `rank`. Linear walk from the minimum.
    pub(crate) fn nth(&self, rank: usize) -> NodeId {
        let mut x = self.minimum(self.root);
        for _ in 0..rank {
            if x == NIL {
                break;
            }
            x = self.successor(x);
        }
        x
    }

    /// In-order node ids.
    pub(crate) fn in_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        let first = self.minimum(self.root);
        std::iter::successors((first != NIL).then_some(first), |&x| {
            let next = self.successor(x);
            (next != NIL).then_some(next)
        })
    }
}
