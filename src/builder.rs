//! Linear-time assembly of a maximally packed tree from monotonic input.
//!
//! The builder keeps one pending node per depth. An element lands in the
//! depth-0 pending node; when that node reaches the configured fill it is
//! sealed, becomes a child of the depth-1 pending node, and the element that
//! triggered the seal moves up to serve as the separator. The same overflow
//! rule cascades, so each element is placed exactly once and each internal
//! node is sealed in amortized constant time.
//!
//! Whole subtrees can be appended too: leaves are drained element by
//! element, while taller trees consolidate the pending state through a
//! concatenation, which keeps plain element appends on the fast path.

use std::rc::Rc;

use crate::node::{max_keys, min_keys, Node};
use crate::surgery;
use crate::tree::Tree;

const FILL_RANGE: &str = "fill factor must lie between the minimum and maximum node size";
const NOT_MONOTONIC: &str = "builder input must be sorted by key";

/// Assembles a tree from a stream of elements and subtrees with
/// non-decreasing keys.
pub(crate) struct Builder<K, V> {
    order: usize,
    fill: usize,
    /// Pending node per depth. `levels[d]` has depth `d`; between appends an
    /// internal pending node has exactly as many children as elements,
    /// waiting for one more child.
    levels: Vec<Node<K, V>>,
    /// One-element lookahead, so duplicate collapsing can replace the value
    /// of the previous element before it is committed.
    buffered: Option<(K, V)>,
    /// Already-consolidated left part, produced by subtree appends.
    consolidated: Option<Tree<K, V>>,
    dedup: bool,
}

impl<K: Ord + Clone, V: Clone> Builder<K, V> {
    pub(crate) fn new(order: usize, fill: usize, dedup: bool) -> Self {
        assert!(
            fill >= min_keys(order) && fill <= max_keys(order),
            "{}",
            FILL_RANGE
        );
        Builder {
            order,
            fill,
            levels: Vec::new(),
            buffered: None,
            consolidated: None,
            dedup,
        }
    }

    /// A builder that packs nodes as full as they can get.
    pub(crate) fn packed(order: usize) -> Self {
        Builder::new(order, max_keys(order), false)
    }

    /// Appends one element. Keys must be non-decreasing over the life of the
    /// builder; with `dedup` on, an element whose key equals its
    /// predecessor's replaces the predecessor instead of joining it.
    pub(crate) fn push(&mut self, element: (K, V)) {
        match self.buffered.take() {
            None => self.buffered = Some(element),
            Some(previous) => {
                if self.dedup && previous.0 == element.0 {
                    self.buffered = Some(element);
                } else {
                    debug_assert!(previous.0 <= element.0, "{}", NOT_MONOTONIC);
                    self.feed(previous);
                    self.buffered = Some(element);
                }
            }
        }
    }

    /// Appends a whole tree whose keys all follow everything appended so
    /// far. The tree's nodes are reused, not copied.
    pub(crate) fn push_tree(&mut self, tree: Tree<K, V>) {
        if tree.is_empty() {
            return;
        }
        if tree.depth() == 0 {
            // A lone leaf is cheaper to drain than to consolidate around.
            for element in tree.into_unique_root().elements {
                self.push(element);
            }
            return;
        }
        let pending = self.take_pending();
        let joined = surgery::concat(pending, tree);
        self.consolidated = Some(match self.consolidated.take() {
            None => joined,
            Some(left) => surgery::concat(left, joined),
        });
    }

    /// Seals everything and returns the finished tree.
    pub(crate) fn finish(mut self) -> Tree<K, V> {
        let pending = self.take_pending();
        match self.consolidated.take() {
            None => pending,
            Some(left) => surgery::concat(left, pending),
        }
    }

    /// Flushes the lookahead and drains the pending levels into a tree,
    /// leaving the builder empty.
    fn take_pending(&mut self) -> Tree<K, V> {
        if let Some(element) = self.buffered.take() {
            self.feed(element);
        }
        let levels = std::mem::take(&mut self.levels);
        let mut levels = levels.into_iter();
        let mut result = match levels.next() {
            None => return Tree::new(self.order),
            Some(mut leaf) => {
                leaf.recount();
                Tree::from_root(leaf)
            }
        };
        // Bottom-up: each pending internal node is one child short, and its
        // last element doubles as the separator toward what is below.
        for mut pending in levels {
            if pending.elements.is_empty() {
                debug_assert!(pending.children.is_empty());
                continue;
            }
            let separator = pending.elements.pop().expect("pending level without elements");
            let left = if pending.elements.is_empty() {
                Tree::from_shared_root(pending.children.pop().expect("pending level without children"))
            } else {
                pending.recount();
                Tree::from_root(pending)
            };
            result = surgery::join(left, separator, result);
        }
        result
    }

    /// Commits one element to the depth-0 pending node.
    fn feed(&mut self, element: (K, V)) {
        if self.levels.is_empty() {
            self.levels.push(Node::leaf(self.order));
        }
        let leaf = &mut self.levels[0];
        if leaf.elements.len() < self.fill {
            leaf.elements.push(element);
        } else {
            let mut sealed = std::mem::replace(&mut self.levels[0], Node::leaf(self.order));
            sealed.recount();
            self.attach(1, Rc::new(sealed), element);
        }
    }

    /// Hands a sealed child and its separator to the pending node at `depth`,
    /// cascading upward when that node is full as well.
    fn attach(&mut self, depth: usize, child: Rc<Node<K, V>>, separator: (K, V)) {
        if self.levels.len() <= depth {
            self.levels.push(Node::internal_shell(self.order, depth));
        }
        let node = &mut self.levels[depth];
        node.children.push(child);
        if node.elements.len() < self.fill {
            node.elements.push(separator);
        } else {
            let mut sealed =
                std::mem::replace(&mut self.levels[depth], Node::internal_shell(self.order, depth));
            sealed.recount();
            self.attach(depth + 1, Rc::new(sealed), separator);
        }
    }
}
