//! The scoped mutating cursor.
//!
//! A [`Cursor`] is the third path flavor: a descent whose every node is
//! uniquely owned. It holds the spine in a `RecRef`, cloning shared nodes
//! with `Rc::make_mut` as it walks down, so edits at the current position
//! never have to re-clone the whole path. Walking back up restores the
//! cached subtree counts, which are allowed to go stale above the current
//! position while the cursor is alive.
//!
//! Cursors only exist inside the scoped `with_cursor_*` callbacks on
//! [`Tree`]; the root is mutably borrowed for the whole scope and therefore
//! unobservable from outside. Every exit path, including a panic in the
//! caller's closure, runs the spine back to the root and leaves a valid
//! tree behind.

use std::rc::Rc;

use recursive_reference::RecRef;

use crate::builder::Builder;
use crate::node::{Node, Selector};
use crate::surgery;
use crate::tree::Tree;

const POP_AT_ROOT: &str = "invariant violated: cursor tried to pop above the root";
const CURSOR_AT_END: &str = "cursor is at the end position and holds no element";
const CURSOR_PAST_END: &str = "cursor operation runs past the end of the tree";

/// A mutating position inside a tree.
///
/// The cursor tracks its element offset and the tree's element count
/// itself, because the counts cached in the nodes along the open spine are
/// only restored on the way back up.
#[derive(destructure)]
pub struct Cursor<'a, K: Ord + Clone, V: Clone> {
    spine: RecRef<'a, Node<K, V>>,
    /// Per level: the child slot the descent went into, except for the last
    /// level, where it is the current slot.
    slots: Vec<usize>,
    /// Per level: the offset at which the node's subtree starts.
    bases: Vec<usize>,
    offset: usize,
    count: usize,
}

impl<'a, K: Ord + Clone, V: Clone> Cursor<'a, K, V> {
    pub(crate) fn new(root: &'a mut Node<K, V>) -> Self {
        let count = root.count;
        Cursor {
            spine: RecRef::new(root),
            slots: vec![0],
            bases: vec![0],
            offset: 0,
            count,
        }
    }

    /// Runs the spine back to the root, restoring counts, and consumes the
    /// cursor without running `Drop` a second time.
    pub(crate) fn finish(mut self) {
        self.unwind_to_root();
        let _fields = self.destructure();
    }

    // ---- queries ----------------------------------------------------

    /// The number of elements before the current position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The number of elements in the tree, tracked across edits.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_at_start(&self) -> bool {
        self.offset == 0
    }

    pub fn is_at_end(&self) -> bool {
        self.offset == self.count
    }

    /// The key at the current position. Must not be at the end.
    pub fn key(&mut self) -> &K {
        assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        self.normalize();
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        &self.spine.elements[slot].0
    }

    /// The value at the current position. Must not be at the end.
    pub fn value(&mut self) -> &V {
        &self.element().1
    }

    /// The element at the current position. Must not be at the end.
    pub fn element(&mut self) -> &(K, V) {
        assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        self.normalize();
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        &self.spine.elements[slot]
    }

    // ---- in-place edits ---------------------------------------------

    /// Replaces the value at the current position, returning the old one.
    pub fn set_value(&mut self, value: V) -> V {
        assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        self.normalize();
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        std::mem::replace(&mut self.spine.elements[slot].1, value)
    }

    /// Replaces the whole element at the current position. The new key must
    /// sort exactly where the old one does; the sorted facades never expose
    /// this directly.
    pub fn replace_element(&mut self, element: (K, V)) -> (K, V) {
        assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        self.normalize();
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        let node = &mut *self.spine;
        node.replace_element(slot, element)
    }

    // ---- movement ---------------------------------------------------

    /// Steps to the next position. Amortized O(1) over a traversal.
    pub fn move_forward(&mut self) {
        assert!(self.offset < self.count, "{}", CURSOR_PAST_END);
        self.normalize();
        self.offset += 1;
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        if self.spine.is_leaf() {
            *self.slots.last_mut().expect(POP_AT_ROOT) = slot + 1;
            if slot + 1 >= self.spine.elements.len() {
                self.ascend_forward();
            }
        } else {
            self.descend(slot + 1);
            self.descend_leftmost();
        }
    }

    /// Steps to the previous position.
    pub fn move_backward(&mut self) {
        assert!(self.offset > 0, "cannot move a cursor before the start");
        self.offset -= 1;
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        if !self.spine.is_leaf() {
            // The predecessor is the rightmost element under the slot.
            self.descend(slot);
            self.descend_rightmost();
            return;
        }
        if slot > 0 {
            *self.slots.last_mut().expect(POP_AT_ROOT) = slot - 1;
            return;
        }
        // Ascend to the first ancestor with an element left of the subtree
        // the position came out of.
        loop {
            self.pop_level();
            let marker = *self.slots.last().expect(POP_AT_ROOT);
            if marker > 0 {
                *self.slots.last_mut().expect(POP_AT_ROOT) = marker - 1;
                return;
            }
        }
    }

    /// Repositions to an arbitrary offset, climbing only as far as the
    /// nearest ancestor whose subtree spans the target.
    pub fn move_to_offset(&mut self, offset: usize) {
        assert!(offset <= self.count, "{}", CURSOR_PAST_END);
        self.seek(offset);
    }

    /// Repositions to the position a key selects, with the same landing
    /// rules as `with_cursor_at_key`.
    pub fn move_to_key(&mut self, key: &K, selector: Selector) {
        while self.slots.len() > 1 {
            self.pop_level();
        }
        self.seek_key(key, selector);
    }

    // ---- structural edits -------------------------------------------

    /// Inserts an element just before the current position; afterwards the
    /// cursor sits one past the new element, so repeated inserts lay out a
    /// run in order.
    pub fn insert(&mut self, element: (K, V)) {
        self.to_leaf_insertion_point();
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        {
            let leaf = &mut *self.spine;
            leaf.insert_element(slot, element);
        }
        *self.slots.last_mut().expect(POP_AT_ROOT) = slot + 1;
        self.offset += 1;
        self.count += 1;
        if self.spine.is_over_full() {
            self.repair_overflow();
        }
    }

    /// Inserts an element just after the current one and moves onto it. On
    /// an empty tree this inserts the first element and points at it.
    pub fn insert_after(&mut self, element: (K, V)) {
        if self.count > 0 {
            assert!(self.offset < self.count, "{}", CURSOR_AT_END);
            self.move_forward();
        }
        self.insert(element);
        self.move_backward();
    }

    /// Splices a sorted run of elements in just before the current
    /// position; the cursor ends one past the spliced run. The run's keys
    /// must fit between the cursor's neighbors.
    pub fn insert_all<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let target = self.offset;
        self.unwind_to_root();
        let order = self.spine.order;
        let whole = self.take_root();
        let (before, after) = surgery::split_pair(whole, target);
        let mut builder = Builder::packed(order);
        let mut added = 0;
        for element in iter {
            builder.push(element);
            added += 1;
        }
        builder.push_tree(after);
        self.put_root(surgery::concat(before, builder.finish()));
        self.count += added;
        self.seek(target + added);
    }

    /// Removes and returns the element at the current position. The cursor
    /// keeps its offset, so it ends up on the element that followed.
    pub fn remove(&mut self) -> (K, V) {
        assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        self.normalize();
        let target = self.offset;
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        if self.spine.is_leaf() {
            let removed = {
                let leaf = &mut *self.spine;
                leaf.remove_element(slot)
            };
            self.count -= 1;
            if self.spine.is_deficient() && self.slots.len() > 1 {
                self.repair_underflow();
            }
            removed
        } else {
            // Swap the in-order successor in, then delete it from its leaf.
            let successor = {
                let node = &*self.spine;
                let mut probe = &node.children[slot + 1];
                while !probe.is_leaf() {
                    probe = &probe.children[0];
                }
                probe.elements[0].clone()
            };
            let removed = {
                let node = &mut *self.spine;
                node.replace_element(slot, successor)
            };
            self.descend(slot + 1);
            self.descend_leftmost();
            {
                let leaf = &mut *self.spine;
                leaf.remove_element(0);
            }
            self.count -= 1;
            if self.spine.is_deficient() {
                self.repair_underflow();
            } else {
                self.seek(target);
            }
            removed
        }
    }

    /// Removes the next `n` elements starting at the current position.
    pub fn remove_n(&mut self, n: usize) {
        let _ = self.extract_n(n);
    }

    /// Removes the next `n` elements and returns them as their own tree.
    pub fn extract_n(&mut self, n: usize) -> Tree<K, V> {
        assert!(self.offset + n <= self.count, "{}", CURSOR_PAST_END);
        let order = self.spine.order;
        if n == 0 {
            return Tree::new(order);
        }
        let target = self.offset;
        self.unwind_to_root();
        let whole = self.take_root();
        let (before, middle, after) = surgery::split_triple(whole, target..target + n);
        self.put_root(surgery::concat(before, after));
        self.count -= n;
        self.seek(target);
        middle
    }

    /// Discards everything before the cursor. With `include_current` the
    /// current element goes too and the cursor lands on its successor.
    pub fn remove_all_before(&mut self, include_current: bool) {
        if include_current {
            assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        }
        let cut = self.offset + include_current as usize;
        self.unwind_to_root();
        let whole = self.take_root();
        let (_, kept) = surgery::split_pair(whole, cut);
        self.put_root(kept);
        self.count -= cut;
        self.seek(0);
    }

    /// Discards everything after the cursor. With `include_current` the
    /// current element goes too and the cursor ends at the end position.
    pub fn remove_all_after(&mut self, include_current: bool) {
        if include_current {
            assert!(self.offset < self.count, "{}", CURSOR_AT_END);
        }
        let kept = if include_current || self.offset == self.count {
            self.offset
        } else {
            self.offset + 1
        };
        self.unwind_to_root();
        let whole = self.take_root();
        let (kept_tree, _) = surgery::split_pair(whole, kept);
        self.put_root(kept_tree);
        self.count = kept;
        self.seek(self.offset.min(kept));
    }

    // ---- positioning from the tree facade ----------------------------

    /// Positions a fresh cursor by key, like the path flavors do: when the
    /// key is absent the cursor lands on the insertion position the selector
    /// describes.
    pub(crate) fn seek_key(&mut self, key: &K, selector: Selector) {
        match selector {
            Selector::First | Selector::Any => self.seek_key_forward(key, Selector::First),
            Selector::After => self.seek_key_forward(key, Selector::After),
            Selector::Last => self.seek_key_last(key),
        }
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        self.offset = self.bases.last().expect(POP_AT_ROOT) + self.spine.offset_of_slot(slot);
    }

    pub(crate) fn seek_offset(&mut self, offset: usize) {
        self.seek(offset);
    }

    fn seek_key_forward(&mut self, key: &K, selector: Selector) {
        let mut candidate: Option<usize> = None;
        loop {
            let (at, leaf) = {
                let node = &*self.spine;
                (node.slot_of_key(key, selector), node.is_leaf())
            };
            if at.matched.is_some() {
                candidate = Some(self.slots.len() - 1);
            }
            if leaf {
                *self.slots.last_mut().expect(POP_AT_ROOT) = at.descend;
                break;
            }
            self.descend(at.descend);
        }
        let landed = {
            let slot = *self.slots.last().expect(POP_AT_ROOT);
            slot < self.spine.elements.len()
        };
        if !landed {
            if let Some(level) = candidate {
                while self.slots.len() > level + 1 {
                    self.pop_level();
                }
            }
        }
    }

    fn seek_key_last(&mut self, key: &K) {
        let mut candidate: Option<(usize, usize)> = None;
        loop {
            let (at, leaf) = {
                let node = &*self.spine;
                (node.slot_of_key(key, Selector::Last), node.is_leaf())
            };
            if let Some(slot) = at.matched {
                candidate = Some((self.slots.len() - 1, slot));
            }
            if leaf {
                *self.slots.last_mut().expect(POP_AT_ROOT) = at.descend;
                break;
            }
            self.descend(at.descend);
        }
        if let Some((level, slot)) = candidate {
            while self.slots.len() > level + 1 {
                self.pop_level();
            }
            *self.slots.last_mut().expect(POP_AT_ROOT) = slot;
        }
    }

    // ---- spine plumbing ---------------------------------------------

    /// Extends the spine into `children[slot]`, cloning it first if it is
    /// shared, so everything on the spine stays uniquely owned.
    fn descend(&mut self, slot: usize) {
        let base = self.bases.last().expect(POP_AT_ROOT) + self.spine.child_base(slot);
        *self.slots.last_mut().expect(POP_AT_ROOT) = slot;
        RecRef::extend(&mut self.spine, move |node| Rc::make_mut(&mut node.children[slot]));
        self.slots.push(0);
        self.bases.push(base);
    }

    fn descend_leftmost(&mut self) {
        while !self.spine.is_leaf() {
            self.descend(0);
        }
    }

    fn descend_rightmost(&mut self) {
        loop {
            let len = self.spine.elements.len();
            if self.spine.is_leaf() {
                *self.slots.last_mut().expect(POP_AT_ROOT) = len - 1;
                return;
            }
            self.descend(len);
        }
    }

    /// Pops one level and restores the parent's cached count.
    fn pop_level(&mut self) {
        RecRef::pop(&mut self.spine).expect(POP_AT_ROOT);
        self.slots.pop();
        self.bases.pop();
        let node = &mut *self.spine;
        node.recount();
    }

    /// Pops exhausted levels after a forward step ran off a leaf. When every
    /// ancestor is exhausted this is the end position and the spine stays.
    fn ascend_forward(&mut self) {
        while self.slots.len() > 1 {
            let parent_slot = self.slots[self.slots.len() - 2];
            self.pop_level();
            if parent_slot < self.spine.elements.len() {
                return;
            }
        }
    }

    /// The position just before the current element always has a leaf form;
    /// this walks the spine there. On an internal element it is the tail of
    /// the element's left subtree, at the end the tail of the rightmost
    /// leaf. A leaf slot already is an insertion slot, so runs of inserts
    /// stay within one leaf until it overflows.
    fn to_leaf_insertion_point(&mut self) {
        if self.spine.is_leaf() {
            return;
        }
        if self.offset == self.count {
            while !self.spine.is_leaf() {
                let len = self.spine.elements.len();
                self.descend(len);
            }
            let len = self.spine.elements.len();
            *self.slots.last_mut().expect(POP_AT_ROOT) = len;
            return;
        }
        let slot = *self.slots.last().expect(POP_AT_ROOT);
        self.descend(slot);
        loop {
            let len = self.spine.elements.len();
            if self.spine.is_leaf() {
                *self.slots.last_mut().expect(POP_AT_ROOT) = len;
                return;
            }
            self.descend(len);
        }
    }

    /// Brings a transient "past the leaf" position back onto an element.
    /// Cheap when the position is already in canonical form.
    fn normalize(&mut self) {
        if self.offset == self.count {
            return;
        }
        loop {
            let slot = *self.slots.last().expect(POP_AT_ROOT);
            if slot < self.spine.elements.len() {
                return;
            }
            self.pop_level();
        }
    }

    /// Repositions by offset: climbs to the nearest spanning ancestor, then
    /// descends. Ancestor counts are restored by the climb itself.
    fn seek(&mut self, offset: usize) {
        debug_assert!(offset <= self.count);
        self.offset = offset;
        loop {
            if self.slots.len() == 1 {
                break;
            }
            let base = *self.bases.last().expect(POP_AT_ROOT);
            let span = self.spine.count;
            if offset >= base && offset < base + span {
                break;
            }
            self.pop_level();
        }
        let mut remaining = offset - self.bases.last().expect(POP_AT_ROOT);
        loop {
            let (at, leaf) = {
                let node = &*self.spine;
                (node.slot_of_offset(remaining), node.is_leaf())
            };
            if at.matched || leaf {
                *self.slots.last_mut().expect(POP_AT_ROOT) = at.slot;
                return;
            }
            self.descend(at.slot);
            remaining = at.child_offset;
        }
    }

    /// Propagates splits up from an over-full node at the top of the spine,
    /// growing a new root level if the cascade reaches the root, then
    /// re-aims the cursor at its offset.
    fn repair_overflow(&mut self) {
        let target = self.offset;
        loop {
            if !self.spine.is_over_full() {
                break;
            }
            if self.slots.len() == 1 {
                // Split the root in place and grow a level above it.
                let node = &mut *self.spine;
                let splinter = node.split();
                let order = node.order;
                let depth = node.depth + 1;
                let left = std::mem::replace(node, Node::internal_shell(order, depth));
                node.elements.push(splinter.separator);
                node.children.push(Rc::new(left));
                node.children.push(Rc::new(splinter.right));
                node.recount();
                break;
            }
            let splinter = {
                let node = &mut *self.spine;
                node.split()
            };
            let marker = self.slots[self.slots.len() - 2];
            RecRef::pop(&mut self.spine).expect(POP_AT_ROOT);
            self.slots.pop();
            self.bases.pop();
            let parent = &mut *self.spine;
            parent.elements.insert(marker, splinter.separator);
            parent.children.insert(marker + 1, Rc::new(splinter.right));
            parent.recount();
        }
        self.seek(target);
    }

    /// Runs `fix_deficiency` up from an under-full node at the top of the
    /// spine, collapsing the root level if it empties out, then re-aims the
    /// cursor at its offset.
    fn repair_underflow(&mut self) {
        let target = self.offset.min(self.count);
        loop {
            if self.slots.len() == 1 {
                let root = &mut *self.spine;
                root.recount();
                collapse_root(root);
                break;
            }
            if !self.spine.is_deficient() {
                break;
            }
            {
                let node = &mut *self.spine;
                node.recount();
            }
            let marker = self.slots[self.slots.len() - 2];
            RecRef::pop(&mut self.spine).expect(POP_AT_ROOT);
            self.slots.pop();
            self.bases.pop();
            let parent = &mut *self.spine;
            parent.fix_deficiency(marker);
            parent.recount();
        }
        self.seek(target);
    }

    /// Runs the spine up to the root, restoring every count, and leaves the
    /// root in canonical form.
    fn unwind_to_root(&mut self) {
        while self.slots.len() > 1 {
            self.pop_level();
        }
        let root = &mut *self.spine;
        root.recount();
        collapse_root(root);
    }

    /// Moves the whole tree out from behind the spine, leaving an empty
    /// root. Only valid with the spine fully unwound.
    fn take_root(&mut self) -> Tree<K, V> {
        debug_assert_eq!(self.slots.len(), 1);
        let root = &mut *self.spine;
        let order = root.order;
        Tree::from_root(std::mem::replace(root, Node::leaf(order)))
    }

    /// Puts a tree back behind the spine. Counterpart of [`Cursor::take_root`].
    fn put_root(&mut self, tree: Tree<K, V>) {
        debug_assert_eq!(self.slots.len(), 1);
        let root = &mut *self.spine;
        *root = tree.into_unique_root();
    }
}

/// Unwraps single-child root levels left behind by collapses, so the root
/// is either a leaf or has at least one element.
fn collapse_root<K: Clone, V: Clone>(root: &mut Node<K, V>) {
    while !root.is_leaf() && root.elements.is_empty() {
        debug_assert_eq!(root.children.len(), 1);
        let child = root.children.pop().expect(POP_AT_ROOT);
        *root = match Rc::try_unwrap(child) {
            Ok(node) => node,
            Err(shared) => (*shared).clone(),
        };
    }
}

/// The walker goes back to the root when dropped, so a cursor scope that
/// unwinds through a panic still leaves the tree valid.
impl<'a, K: Ord + Clone, V: Clone> Drop for Cursor<'a, K, V> {
    fn drop(&mut self) {
        self.unwind_to_root();
    }
}
