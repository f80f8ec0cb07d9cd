//! Root-to-leaf descent records.
//!
//! A [`Path`] remembers how a position in the tree was reached: the stack of
//! `(node, slot)` steps, the offset of every visited subtree, and the running
//! element offset of the position itself. It is generic over how the node
//! references are held, which gives the two read-only flavors from a single
//! implementation:
//!
//! * [`WeakPath`] borrows the nodes, and is what iterators ride on while the
//!   tree root is held elsewhere.
//! * [`StrongPath`] owns its nodes through [`Rc`] clones, so a descent stays
//!   alive on its own. Slicing and merging work on strong paths.
//!
//! The third flavor, the uniquely-owning mutating descent, lives in the
//! cursor module; it shares the node-level slot arithmetic with the paths
//! here but holds its spine through a `RecRef`.

use std::rc::Rc;

use crate::node::{Node, Selector};
use crate::surgery;
use crate::tree::Tree;

pub(crate) const PATH_EMPTY: &str = "invariant violated: a path always has at least one step";
pub(crate) const PATH_AT_END: &str = "path is at the end position and holds no element";

/// How a path holds on to a node. Cloning a handle is cheap for every
/// flavor; reads go through [`NodeHandle::node`].
pub(crate) trait NodeHandle: Clone {
    type K;
    type V;
    fn node(&self) -> &Node<Self::K, Self::V>;
    /// A handle to `children[slot]` of this node.
    fn child(&self, slot: usize) -> Self;
}

impl<'a, K, V> NodeHandle for &'a Node<K, V> {
    type K = K;
    type V = V;

    fn node(&self) -> &Node<K, V> {
        self
    }

    fn child(&self, slot: usize) -> Self {
        let node: &'a Node<K, V> = self;
        &node.children[slot]
    }
}

impl<K, V> NodeHandle for Rc<Node<K, V>> {
    type K = K;
    type V = V;

    fn node(&self) -> &Node<K, V> {
        self
    }

    fn child(&self, slot: usize) -> Self {
        self.children[slot].clone()
    }
}

/// One level of a descent: the node, the active slot within it, and the
/// in-order offset at which the node's subtree starts.
///
/// For every step but the last the slot marks the child the descent went
/// into. For the last step the slot is an element position, except in the
/// end state where the path runs down the rightmost spine with every slot
/// past its node's elements.
pub(crate) struct Step<H> {
    pub(crate) handle: H,
    pub(crate) slot: usize,
    pub(crate) base: usize,
}

impl<H: Clone> Clone for Step<H> {
    fn clone(&self) -> Self {
        Step { handle: self.handle.clone(), slot: self.slot, base: self.base }
    }
}

pub(crate) struct Path<H> {
    steps: Vec<Step<H>>,
    offset: usize,
    count: usize,
}

impl<H: Clone> Clone for Path<H> {
    fn clone(&self) -> Self {
        Path { steps: self.steps.clone(), offset: self.offset, count: self.count }
    }
}

pub(crate) type WeakPath<'a, K, V> = Path<&'a Node<K, V>>;
pub(crate) type StrongPath<K, V> = Path<Rc<Node<K, V>>>;

impl<H: NodeHandle> Path<H> {
    /// Descends to the position with the given offset. `offset == count` is
    /// the end sentinel; anything beyond is a caller error.
    pub(crate) fn at_offset(root: H, offset: usize) -> Self {
        let count = root.node().count;
        debug_assert!(offset <= count);
        let mut path = Path {
            steps: vec![Step { handle: root, slot: 0, base: 0 }],
            offset,
            count,
        };
        path.descend_by_offset(offset);
        path
    }

    pub(crate) fn at_start(root: H) -> Self {
        Self::at_offset(root, 0)
    }

    pub(crate) fn at_end(root: H) -> Self {
        let count = root.node().count;
        Self::at_offset(root, count)
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn is_at_start(&self) -> bool {
        self.offset == 0
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.offset == self.count
    }

    fn top(&self) -> &Step<H> {
        self.steps.last().expect(PATH_EMPTY)
    }

    /// The element at the current position. The path must not be at the end.
    pub(crate) fn element(&self) -> &(H::K, H::V) {
        debug_assert!(!self.is_at_end(), "{}", PATH_AT_END);
        let step = self.top();
        &step.handle.node().elements[step.slot]
    }

    /// Visits the `(node, slot)` steps of the descent, root first when
    /// `ascending` is false, leaf first when it is true.
    pub(crate) fn for_each_slot<F>(&self, ascending: bool, mut f: F)
    where
        F: FnMut(&Node<H::K, H::V>, usize),
    {
        if ascending {
            for step in self.steps.iter().rev() {
                f(step.handle.node(), step.slot);
            }
        } else {
            for step in &self.steps {
                f(step.handle.node(), step.slot);
            }
        }
    }

    /// Re-aims the top step and extends the descent until an element or a
    /// leaf position is found. `remaining` is relative to the top's base.
    fn descend_by_offset(&mut self, mut remaining: usize) {
        loop {
            let (slot, done, child_offset, child_base, child) = {
                let step = self.steps.last().expect(PATH_EMPTY);
                let node = step.handle.node();
                let at = node.slot_of_offset(remaining);
                if at.matched || node.is_leaf() {
                    (at.slot, true, 0, 0, None)
                } else {
                    let base = step.base + node.child_base(at.slot);
                    (at.slot, false, at.child_offset, base, Some(step.handle.child(at.slot)))
                }
            };
            let step = self.steps.last_mut().expect(PATH_EMPTY);
            step.slot = slot;
            if done {
                return;
            }
            self.steps.push(Step { handle: child.unwrap(), slot: 0, base: child_base });
            remaining = child_offset;
        }
    }

    /// Extends the descent to the leftmost element under `handle`.
    fn push_leftmost(&mut self, mut handle: H, base: usize) {
        loop {
            let leaf = handle.node().is_leaf();
            let child = if leaf { None } else { Some(handle.child(0)) };
            // The first child starts at the same base as its parent.
            self.steps.push(Step { handle, slot: 0, base });
            match child {
                None => return,
                Some(c) => handle = c,
            }
        }
    }

    /// Extends the descent to the rightmost element under `handle`.
    fn push_rightmost(&mut self, mut handle: H, mut base: usize) {
        loop {
            let (slot, next) = {
                let node = handle.node();
                if node.is_leaf() {
                    (node.elements.len() - 1, None)
                } else {
                    let slot = node.elements.len();
                    let child_base = base + node.child_base(slot);
                    (slot, Some((handle.child(slot), child_base)))
                }
            };
            self.steps.push(Step { handle, slot, base });
            match next {
                None => return,
                Some((child, child_base)) => {
                    handle = child;
                    base = child_base;
                }
            }
        }
    }

    /// Steps to the next element in order. Worst case O(depth), amortized
    /// O(1) over a full traversal. Must not be called at the end position.
    pub(crate) fn move_forward(&mut self) {
        debug_assert!(self.offset < self.count, "{}", PATH_AT_END);
        self.offset += 1;
        let descend = {
            let step = self.steps.last_mut().expect(PATH_EMPTY);
            let node = step.handle.node();
            step.slot += 1;
            if node.is_leaf() {
                None
            } else {
                // The successor is the leftmost element of the next child.
                let base = step.base + node.child_base(step.slot);
                Some((step.handle.child(step.slot), base))
            }
        };
        match descend {
            Some((child, base)) => self.push_leftmost(child, base),
            None => {
                let exhausted = self.top().slot >= self.top().handle.node().elements.len();
                if exhausted {
                    self.ascend_forward();
                }
            }
        }
    }

    /// Pops exhausted steps until an ancestor still has an element after the
    /// subtree the path came out of. If there is none, the path is at the end
    /// position and the exhausted spine stays in place.
    fn ascend_forward(&mut self) {
        let mut keep = self.steps.len();
        while keep > 1 {
            let parent = &self.steps[keep - 2];
            if parent.slot < parent.handle.node().elements.len() {
                self.steps.truncate(keep - 1);
                return;
            }
            keep -= 1;
        }
    }

    /// Steps to the previous element in order. Must not be called at the
    /// start position.
    pub(crate) fn move_backward(&mut self) {
        debug_assert!(self.offset > 0, "cannot move a path before the start");
        self.offset -= 1;
        let descend = {
            let step = self.steps.last_mut().expect(PATH_EMPTY);
            let node = step.handle.node();
            if node.is_leaf() {
                if step.slot > 0 {
                    step.slot -= 1;
                    return;
                }
                None
            } else {
                // The predecessor is the rightmost element of the slot's child.
                let base = step.base + node.child_base(step.slot);
                Some((step.handle.child(step.slot), base))
            }
        };
        match descend {
            Some((child, base)) => self.push_rightmost(child, base),
            None => self.ascend_backward(),
        }
    }

    fn ascend_backward(&mut self) {
        let mut keep = self.steps.len();
        while keep > 1 {
            if self.steps[keep - 2].slot > 0 {
                self.steps.truncate(keep - 1);
                let step = self.steps.last_mut().expect(PATH_EMPTY);
                step.slot -= 1;
                return;
            }
            keep -= 1;
        }
        unreachable!("move_backward called at the start position");
    }

    /// Repositions the path to an arbitrary offset, climbing only to the
    /// nearest ancestor whose subtree spans the target instead of restarting
    /// from the root.
    pub(crate) fn move_to_offset(&mut self, offset: usize) {
        debug_assert!(offset <= self.count);
        while self.steps.len() > 1 {
            let step = self.top();
            let start = step.base;
            let span = step.handle.node().count;
            if offset >= start && offset < start + span {
                break;
            }
            self.steps.pop();
        }
        self.offset = offset;
        let base = self.top().base;
        self.descend_by_offset(offset - base);
    }
}

impl<H: NodeHandle> Path<H>
where
    H::K: Ord,
{
    /// Descends to a position selected by key. Returns the path and whether
    /// an element with that key exists in the tree. When the key is absent
    /// the path lands on the position where the key would be inserted, as
    /// seen by the selector.
    pub(crate) fn at_key(root: H, key: &H::K, selector: Selector) -> (Self, bool) {
        let count = root.node().count;
        let mut path = Path {
            steps: vec![Step { handle: root, slot: 0, base: 0 }],
            offset: 0,
            count,
        };
        let found = match selector {
            Selector::First | Selector::Any => path.descend_by_key(key, Selector::First),
            Selector::After => path.descend_by_key(key, Selector::After),
            Selector::Last => path.descend_by_key_last(key),
        };
        let step = path.steps.last().expect(PATH_EMPTY);
        path.offset = step.base + step.handle.node().offset_of_slot(step.slot);
        (path, found)
    }

    /// Shared descent for the `First` and `After` selectors: both look for
    /// the first position satisfying a lower bound, keeping the deepest
    /// boundary candidate seen on the way down and cutting the path back to
    /// it when the leaf holds nothing better.
    fn descend_by_key(&mut self, key: &H::K, selector: Selector) -> bool {
        let mut candidate: Option<usize> = None;
        let mut found = false;
        loop {
            let (at, leaf, child, child_base) = {
                let step = self.steps.last().expect(PATH_EMPTY);
                let node = step.handle.node();
                let at = node.slot_of_key(key, selector);
                if node.is_leaf() {
                    (at, true, None, 0)
                } else {
                    let base = step.base + node.child_base(at.descend);
                    (at, false, Some(step.handle.child(at.descend)), base)
                }
            };
            // For `After`, key presence is witnessed by an equal element just
            // left of the descent slot; for `First` by the match itself.
            match selector {
                Selector::After => {
                    let step = self.steps.last().expect(PATH_EMPTY);
                    let node = step.handle.node();
                    if at.descend > 0 && node.elements[at.descend - 1].0 == *key {
                        found = true;
                    }
                }
                _ => found |= at.matched.is_some(),
            }
            let step = self.steps.last_mut().expect(PATH_EMPTY);
            step.slot = at.descend;
            if at.matched.is_some() {
                candidate = Some(self.steps.len() - 1);
            }
            match child {
                None => break,
                Some(c) => self.steps.push(Step { handle: c, slot: 0, base: child_base }),
            }
        }
        let landed = {
            let step = self.steps.last().expect(PATH_EMPTY);
            step.slot < step.handle.node().elements.len()
        };
        if !landed {
            if let Some(keep) = candidate {
                self.steps.truncate(keep + 1);
            }
        }
        found
    }

    /// Descent for the `Last` selector: follows the upper bound, remembering
    /// the deepest element equal to the key.
    fn descend_by_key_last(&mut self, key: &H::K) -> bool {
        let mut candidate: Option<(usize, usize)> = None;
        loop {
            let (at, child, child_base) = {
                let step = self.steps.last().expect(PATH_EMPTY);
                let node = step.handle.node();
                let at = node.slot_of_key(key, Selector::Last);
                if node.is_leaf() {
                    (at, None, 0)
                } else {
                    let base = step.base + node.child_base(at.descend);
                    (at, Some(step.handle.child(at.descend)), base)
                }
            };
            let step = self.steps.last_mut().expect(PATH_EMPTY);
            step.slot = at.descend;
            if let Some(slot) = at.matched {
                candidate = Some((self.steps.len() - 1, slot));
            }
            match child {
                None => break,
                Some(c) => self.steps.push(Step { handle: c, slot: 0, base: child_base }),
            }
        }
        match candidate {
            Some((keep, slot)) => {
                self.steps.truncate(keep + 1);
                self.steps[keep].slot = slot;
                true
            }
            None => false,
        }
    }
}

impl<'a, K, V> WeakPath<'a, K, V> {
    /// The current element with the lifetime of the tree borrow rather than
    /// of the path, so an iterator can hand it out while it keeps moving.
    pub(crate) fn element_detached(&self) -> &'a (K, V) {
        debug_assert!(!self.is_at_end(), "{}", PATH_AT_END);
        let step = self.steps.last().expect(PATH_EMPTY);
        let node: &'a Node<K, V> = step.handle;
        &node.elements[step.slot]
    }
}

impl<K: Clone, V: Clone> StrongPath<K, V> {
    /// The chain of nodes whose subtrees begin exactly at the current
    /// position, smallest first. Used by the merge walk to find shared
    /// subtrees; a node appears here when every step below it sits at
    /// slot zero.
    pub(crate) fn start_aligned_chain(&self) -> Vec<&Rc<Node<K, V>>> {
        let mut chain = Vec::new();
        if self.is_at_end() {
            return chain;
        }
        for step in self.steps.iter().rev() {
            if step.slot != 0 {
                break;
            }
            // An internal node whose slot 0 is the current *element* is not
            // start-aligned: its first child's subtree precedes the position.
            if chain.is_empty() && !step.handle.is_leaf() {
                break;
            }
            chain.push(&step.handle);
        }
        chain
    }

    /// Cuts the tree at the current position. Consumes the path and returns
    /// the elements before the position, the element at it, and the elements
    /// after it, as trees sharing whatever subtrees were off the descent.
    pub(crate) fn split(mut self) -> (Tree<K, V>, (K, V), Tree<K, V>) {
        assert!(self.offset < self.count, "{}", PATH_AT_END);
        let last = self.steps.pop().expect(PATH_EMPTY);
        let node = last.handle;
        let slot = last.slot;
        let order = node.order;
        let element = node.elements[slot].clone();
        let (mut prefix, mut suffix) = if node.is_leaf() {
            (
                Tree::from_elements(order, node.elements[..slot].to_vec()),
                Tree::from_elements(order, node.elements[slot + 1..].to_vec()),
            )
        } else {
            (
                side_tree(&node, 0, slot),
                side_tree(&node, slot + 1, node.elements.len()),
            )
        };
        for step in self.steps.iter().rev() {
            let node = &*step.handle;
            let slot = step.slot;
            if slot > 0 {
                let left = side_tree(node, 0, slot - 1);
                prefix = surgery::join(left, node.elements[slot - 1].clone(), prefix);
            }
            if slot < node.elements.len() {
                let right = side_tree(node, slot + 1, node.elements.len());
                suffix = surgery::join(suffix, node.elements[slot].clone(), right);
            }
        }
        (prefix, element, suffix)
    }

    /// Everything strictly before the current position.
    pub(crate) fn prefix(mut self) -> Tree<K, V> {
        let last = self.steps.pop().expect(PATH_EMPTY);
        let node = last.handle;
        let slot = last.slot;
        let order = node.order;
        let mut prefix = if node.is_leaf() {
            Tree::from_elements(order, node.elements[..slot].to_vec())
        } else {
            side_tree(&node, 0, slot)
        };
        for step in self.steps.iter().rev() {
            let node = &*step.handle;
            let slot = step.slot;
            if slot > 0 {
                let left = side_tree(node, 0, slot - 1);
                prefix = surgery::join(left, node.elements[slot - 1].clone(), prefix);
            }
        }
        prefix
    }

    /// Everything strictly after the current position.
    pub(crate) fn suffix(mut self) -> Tree<K, V> {
        let order = self.top().handle.order;
        if self.is_at_end() {
            return Tree::new(order);
        }
        let last = self.steps.pop().expect(PATH_EMPTY);
        let node = last.handle;
        let slot = last.slot;
        let mut suffix = if node.is_leaf() {
            Tree::from_elements(order, node.elements[slot + 1..].to_vec())
        } else {
            side_tree(&node, slot + 1, node.elements.len())
        };
        for step in self.steps.iter().rev() {
            let node = &*step.handle;
            let slot = step.slot;
            if slot < node.elements.len() {
                let right = side_tree(node, slot + 1, node.elements.len());
                suffix = surgery::join(suffix, node.elements[slot].clone(), right);
            }
        }
        suffix
    }
}

/// Builds the tree covering the element range `lo..hi` of an internal node,
/// together with the flanking child subtrees `lo..=hi`, which stay shared by
/// reference. With no elements in range the single flanked child itself is
/// the result; it may be below the non-root minimum, which is fine for a
/// root.
fn side_tree<K: Clone, V: Clone>(node: &Node<K, V>, lo: usize, hi: usize) -> Tree<K, V> {
    let elements: Vec<(K, V)> = node.elements[lo..hi].to_vec();
    let children: Vec<Rc<Node<K, V>>> = node.children[lo..=hi].to_vec();
    debug_assert_eq!(children.len(), elements.len() + 1);
    if elements.is_empty() {
        Tree::from_shared_root(children.into_iter().next().expect(PATH_EMPTY))
    } else {
        Tree::from_root(Node::from_parts(node.order, node.depth, elements, children))
    }
}
