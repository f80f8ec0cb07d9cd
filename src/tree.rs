//! The tree value itself.
//!
//! A [`Tree`] is a thin wrapper around an owned root node. Cloning a tree
//! clones one `Rc`, so every clone is a full logical copy in O(1); the
//! versions share structure until one of them is edited, and edits re-clone
//! only the nodes on the edited path. The collection facades (maps, sets,
//! bags, lists) hold a `Tree` and dispatch to the operations here.

use std::rc::Rc;

use crate::builder::Builder;
use crate::cursor::Cursor;
use crate::iterators::{IntoIter, Iter};
use crate::merge::{self, MergeKind, Strategy};
use crate::node::{max_keys, order_for, Node, Selector};
use crate::path::{StrongPath, WeakPath};
use crate::surgery;

const OFFSET_RANGE: &str = "offset out of range";
const TREE_EMPTY: &str = "operation on an empty tree";

/// A stable handle for an offset into one specific version of a tree.
///
/// An `Index` stays valid only as long as the tree it came from is not
/// mutated; using it against a mutated tree is a contract violation and is
/// not detected.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Index(usize);

/// An ordered collection of `(key, value)` elements in a copy-on-write
/// B-tree. Duplicate keys are allowed and keep their insertion order.
///
/// ```
/// use copse::Tree;
///
/// let mut tree: Tree<i32, &str> = Tree::new(5);
/// tree.insert((2, "two"));
/// tree.insert((1, "one"));
/// tree.insert((3, "three"));
///
/// let snapshot = tree.clone(); // O(1), shares structure
/// tree.remove_first();
/// assert_eq!(tree.len(), 2);
/// assert_eq!(snapshot.len(), 3);
/// ```
pub struct Tree<K, V> {
    root: Rc<Node<K, V>>,
}

impl<K, V> Clone for Tree<K, V> {
    fn clone(&self) -> Self {
        Tree { root: self.root.clone() }
    }
}

impl<K, V> Tree<K, V> {
    /// Creates an empty tree with the given branching factor, which must be
    /// odd and at least 3.
    pub fn new(order: usize) -> Self {
        Tree { root: Rc::new(Node::leaf(order)) }
    }

    pub(crate) fn from_root(root: Node<K, V>) -> Self {
        Tree { root: Rc::new(root) }
    }

    pub(crate) fn from_shared_root(root: Rc<Node<K, V>>) -> Self {
        Tree { root }
    }

    pub(crate) fn from_elements(order: usize, elements: Vec<(K, V)>) -> Self {
        debug_assert!(elements.len() <= max_keys(order));
        let mut leaf = Node::leaf(order);
        leaf.elements = elements;
        leaf.recount();
        Tree::from_root(leaf)
    }

    pub(crate) fn shared_root(&self) -> Rc<Node<K, V>> {
        self.root.clone()
    }

    pub(crate) fn into_shared_root(self) -> Rc<Node<K, V>> {
        self.root
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.root.count
    }

    pub fn is_empty(&self) -> bool {
        self.root.count == 0
    }

    /// The depth of the root; 0 for a tree that is a single leaf.
    pub fn depth(&self) -> usize {
        self.root.depth
    }

    /// The branching factor this tree was created with.
    pub fn order(&self) -> usize {
        self.root.order
    }

    /// Converts an offset into an [`Index`] bound to this tree version.
    pub fn index_of(&self, offset: usize) -> Index {
        assert!(offset <= self.len(), "{}", OFFSET_RANGE);
        Index(offset)
    }

    /// The offset an [`Index`] stands for.
    pub fn offset_of(&self, index: Index) -> usize {
        index.0
    }
}

impl<K: Clone, V: Clone> Tree<K, V> {
    /// The root node, cloned out of the `Rc` if other versions still hold it.
    pub(crate) fn into_unique_root(self) -> Node<K, V> {
        match Rc::try_unwrap(self.root) {
            Ok(node) => node,
            Err(shared) => (*shared).clone(),
        }
    }

    pub(crate) fn for_each_node(&self, f: &mut impl FnMut(&Node<K, V>)) {
        fn walk<K, V, F: FnMut(&Node<K, V>)>(node: &Node<K, V>, f: &mut F) {
            f(node);
            for child in &node.children {
                walk(child, f);
            }
        }
        walk(&self.root, f);
    }
}

// ---- construction from element streams -------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Builds a tree from elements already sorted by key, in linear time.
    /// `fill` is the number of elements a packed node gets; with
    /// `drop_duplicates` a repeated key keeps only its last value.
    pub fn from_sorted<I>(iter: I, order: usize, fill: usize, drop_duplicates: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut builder = Builder::new(order, fill, drop_duplicates);
        for element in iter {
            builder.push(element);
        }
        builder.finish()
    }

    /// Builds a tree from elements in any order. The sort is stable, so
    /// duplicate keys keep their order of appearance, and with
    /// `drop_duplicates` the last value for a key wins.
    pub fn from_unsorted<I>(iter: I, order: usize, drop_duplicates: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut elements: Vec<(K, V)> = iter.into_iter().collect();
        elements.sort_by(|a, b| a.0.cmp(&b.0));
        Tree::from_sorted(elements, order, max_keys(order), drop_duplicates)
    }
}

impl<K, V> Default for Tree<K, V> {
    /// An empty tree with an order fitted to the element size.
    fn default() -> Self {
        Tree::new(order_for::<K, V>())
    }
}

impl<K: Ord + Clone, V: Clone> std::iter::FromIterator<(K, V)> for Tree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tree::from_unsorted(iter, order_for::<K, V>(), false)
    }
}

impl<K: Ord + Clone, V: Clone> Extend<(K, V)> for Tree<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for element in iter {
            self.insert(element);
        }
    }
}

// ---- queries ----------------------------------------------------------

impl<K: Ord, V> Tree<K, V> {
    /// The value of an element with this key, picked by the selector, or
    /// `None` when the selected position does not hold the key.
    pub fn value_of(&self, key: &K, selector: Selector) -> Option<&V> {
        let (path, found) = WeakPath::at_key(&*self.root, key, selector);
        if !found || path.is_at_end() {
            return None;
        }
        let element = path.element_detached();
        if element.0 == *key {
            Some(&element.1)
        } else {
            None
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let (_, found) = WeakPath::at_key(&*self.root, key, Selector::Any);
        found
    }

    /// The offset of the position the selector picks for this key, or
    /// `None` when the key is absent.
    pub fn offset_of_key(&self, key: &K, selector: Selector) -> Option<usize> {
        let (path, found) = WeakPath::at_key(&*self.root, key, selector);
        if found {
            Some(path.offset())
        } else {
            None
        }
    }
}

impl<K, V> Tree<K, V> {
    /// The element at an offset. The offset must be below `len`.
    pub fn element_at(&self, offset: usize) -> &(K, V) {
        assert!(offset < self.len(), "{}", OFFSET_RANGE);
        WeakPath::at_offset(&*self.root, offset).element_detached()
    }

    pub fn first(&self) -> Option<&(K, V)> {
        if self.is_empty() {
            None
        } else {
            Some(self.element_at(0))
        }
    }

    pub fn last(&self) -> Option<&(K, V)> {
        if self.is_empty() {
            None
        } else {
            Some(self.element_at(self.len() - 1))
        }
    }

    /// A borrowing in-order iterator.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.root, 0)
    }

    /// An iterator starting at an offset.
    pub fn iter_from_offset(&self, offset: usize) -> Iter<'_, K, V> {
        assert!(offset <= self.len(), "{}", OFFSET_RANGE);
        Iter::new(&self.root, offset)
    }
}

impl<K: Ord, V> Tree<K, V> {
    /// An iterator starting at the position a key selects. With an absent
    /// key it starts at the insertion position, so iteration simply begins
    /// with the first larger key.
    pub fn iter_from_key(&self, key: &K, selector: Selector) -> Iter<'_, K, V> {
        let (path, _) = WeakPath::at_key(&*self.root, key, selector);
        Iter::from_path(path)
    }
}

// ---- cursors ----------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Runs a cursor scope at an offset. The tree is mutably borrowed for
    /// the whole scope and replaced by whatever the cursor leaves behind,
    /// even if the closure panics.
    pub fn with_cursor_at_offset<R>(
        &mut self,
        offset: usize,
        f: impl FnOnce(&mut Cursor<'_, K, V>) -> R,
    ) -> R {
        assert!(offset <= self.len(), "{}", OFFSET_RANGE);
        let root = Rc::make_mut(&mut self.root);
        let mut cursor = Cursor::new(root);
        cursor.seek_offset(offset);
        let result = f(&mut cursor);
        cursor.finish();
        result
    }

    pub fn with_cursor_at_start<R>(&mut self, f: impl FnOnce(&mut Cursor<'_, K, V>) -> R) -> R {
        self.with_cursor_at_offset(0, f)
    }

    pub fn with_cursor_at_end<R>(&mut self, f: impl FnOnce(&mut Cursor<'_, K, V>) -> R) -> R {
        let len = self.len();
        self.with_cursor_at_offset(len, f)
    }

    /// Runs a cursor scope at the position a key selects.
    pub fn with_cursor_at_key<R>(
        &mut self,
        key: &K,
        selector: Selector,
        f: impl FnOnce(&mut Cursor<'_, K, V>) -> R,
    ) -> R {
        let root = Rc::make_mut(&mut self.root);
        let mut cursor = Cursor::new(root);
        cursor.seek_key(key, selector);
        let result = f(&mut cursor);
        cursor.finish();
        result
    }
}

// ---- point mutation ---------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Inserts an element; a duplicate key goes after its existing equals,
    /// so insertion order among duplicates is preserved.
    pub fn insert(&mut self, element: (K, V)) {
        self.insert_at(element, Selector::After);
    }

    /// Inserts an element at the position the selector picks among existing
    /// duplicates of its key.
    pub fn insert_at(&mut self, element: (K, V), selector: Selector) {
        let key = element.0.clone();
        self.with_cursor_at_key(&key, selector, move |cursor| cursor.insert(element));
    }

    /// Inserts, or replaces the value of some element already carrying the
    /// key. Returns the replaced value.
    pub fn insert_or_replace(&mut self, element: (K, V)) -> Option<V> {
        let key = element.0.clone();
        self.with_cursor_at_key(&key, Selector::First, move |cursor| {
            let occupied = !cursor.is_at_end() && *cursor.key() == element.0;
            if occupied {
                Some(cursor.set_value(element.1))
            } else {
                cursor.insert(element);
                None
            }
        })
    }

    /// Inserts unless the key is already present; returns the present value
    /// instead of inserting when it is.
    pub fn insert_or_find(&mut self, element: (K, V)) -> Option<V> {
        let key = element.0.clone();
        self.with_cursor_at_key(&key, Selector::Any, move |cursor| {
            let occupied = !cursor.is_at_end() && *cursor.key() == element.0;
            if occupied {
                Some(cursor.value().clone())
            } else {
                cursor.insert(element);
                None
            }
        })
    }

    /// Removes the element the selector picks for this key, if the key is
    /// present at the selected position.
    pub fn remove(&mut self, key: &K, selector: Selector) -> Option<(K, V)> {
        self.with_cursor_at_key(key, selector, |cursor| {
            let occupied = !cursor.is_at_end() && cursor.key() == key;
            if occupied {
                Some(cursor.remove())
            } else {
                None
            }
        })
    }

    /// Removes and returns the element at an offset.
    pub fn remove_at_offset(&mut self, offset: usize) -> (K, V) {
        assert!(offset < self.len(), "{}", OFFSET_RANGE);
        self.with_cursor_at_offset(offset, |cursor| cursor.remove())
    }

    /// Removes and returns the element an [`Index`] stands for. The index
    /// must come from this tree version.
    pub fn remove_at(&mut self, index: Index) -> (K, V) {
        self.remove_at_offset(index.0)
    }

    /// Removes and returns the first element. The tree must not be empty;
    /// see [`Tree::pop_first`] for the checked variant.
    pub fn remove_first(&mut self) -> (K, V) {
        assert!(!self.is_empty(), "{}", TREE_EMPTY);
        self.remove_at_offset(0)
    }

    /// Removes and returns the last element. The tree must not be empty.
    pub fn remove_last(&mut self) -> (K, V) {
        assert!(!self.is_empty(), "{}", TREE_EMPTY);
        let last = self.len() - 1;
        self.remove_at_offset(last)
    }

    pub fn pop_first(&mut self) -> Option<(K, V)> {
        if self.is_empty() {
            None
        } else {
            Some(self.remove_at_offset(0))
        }
    }

    pub fn pop_last(&mut self) -> Option<(K, V)> {
        if self.is_empty() {
            None
        } else {
            Some(self.remove_last())
        }
    }

    /// Drops the first `n` elements; fewer if the tree is shorter.
    pub fn remove_first_n(&mut self, n: usize) {
        let n = n.min(self.len());
        self.remove_range(0..n);
    }

    /// Drops the last `n` elements; fewer if the tree is shorter.
    pub fn remove_last_n(&mut self, n: usize) {
        let n = n.min(self.len());
        let len = self.len();
        self.remove_range(len - n..len);
    }
}

// ---- bulk edits -------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Inserts an element at a position. The key must sort between the
    /// position's neighbors; the positional facades own that contract.
    pub fn insert_at_offset(&mut self, offset: usize, element: (K, V)) {
        assert!(offset <= self.len(), "{}", OFFSET_RANGE);
        self.with_cursor_at_offset(offset, move |cursor| cursor.insert(element));
    }

    /// Splices a sorted run of elements in at a position.
    pub fn insert_sequence_at_offset<I>(&mut self, offset: usize, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        assert!(offset <= self.len(), "{}", OFFSET_RANGE);
        self.with_cursor_at_offset(offset, move |cursor| cursor.insert_all(iter));
    }

    /// Removes `range` and returns it as its own tree. Out-of-range parts
    /// of the range are clamped away.
    pub fn extract_range(&mut self, range: std::ops::Range<usize>) -> Tree<K, V> {
        let range = self.clamp_range(range);
        let whole = self.take();
        let (before, middle, after) = surgery::split_triple(whole, range);
        *self = surgery::concat(before, after);
        middle
    }

    /// Removes `range`, clamped to the tree.
    pub fn remove_range(&mut self, range: std::ops::Range<usize>) {
        let _ = self.extract_range(range);
    }

    /// Replaces `range` with a sorted run of elements.
    pub fn replace_range<I>(&mut self, range: std::ops::Range<usize>, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let range = self.clamp_range(range);
        let start = range.start;
        self.remove_range(range);
        self.insert_sequence_at_offset(start, iter);
    }

    fn take(&mut self) -> Tree<K, V> {
        let order = self.order();
        std::mem::replace(self, Tree::new(order))
    }

    fn clamp_range(&self, range: std::ops::Range<usize>) -> std::ops::Range<usize> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        start..end
    }
}

// ---- slicing ----------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// The first `n` elements as a tree; the whole tree if it is shorter.
    pub fn prefix(&self, n: usize) -> Tree<K, V> {
        let n = n.min(self.len());
        if n == self.len() {
            return self.clone();
        }
        StrongPath::at_offset(self.shared_root(), n).prefix()
    }

    /// The last `n` elements as a tree; the whole tree if it is shorter.
    pub fn suffix(&self, n: usize) -> Tree<K, V> {
        let n = n.min(self.len());
        let start = self.len() - n;
        surgery::split_pair(self.clone(), start).1
    }

    /// Everything strictly before an offset.
    pub fn prefix_up_to(&self, offset: usize) -> Tree<K, V> {
        self.prefix(offset)
    }

    /// Everything up to and including an offset.
    pub fn prefix_through(&self, offset: usize) -> Tree<K, V> {
        self.prefix(offset.saturating_add(1))
    }

    /// Everything from an offset on.
    pub fn suffix_from(&self, offset: usize) -> Tree<K, V> {
        let offset = offset.min(self.len());
        surgery::split_pair(self.clone(), offset).1
    }

    /// The elements of an offset range, clamped to the tree.
    pub fn subrange_by_offsets(&self, range: std::ops::Range<usize>) -> Tree<K, V> {
        let range = self.clamp_range(range);
        surgery::split_triple(self.clone(), range).1
    }

    /// The elements whose keys fall in a key range; bounds may lie outside
    /// the stored keys.
    pub fn subrange_by_keys<R>(&self, range: R) -> Tree<K, V>
    where
        R: std::ops::RangeBounds<K>,
    {
        use std::ops::Bound;
        let start = match range.start_bound() {
            Bound::Unbounded => 0,
            Bound::Included(key) => self.boundary_offset(key, Selector::First),
            Bound::Excluded(key) => self.boundary_offset(key, Selector::After),
        };
        let end = match range.end_bound() {
            Bound::Unbounded => self.len(),
            Bound::Included(key) => self.boundary_offset(key, Selector::After),
            Bound::Excluded(key) => self.boundary_offset(key, Selector::First),
        };
        self.subrange_by_offsets(start..end.max(start))
    }

    /// The offset of the boundary a key selects, whether or not the key is
    /// present.
    fn boundary_offset(&self, key: &K, selector: Selector) -> usize {
        let (path, _) = WeakPath::at_key(&*self.root, key, selector);
        path.offset()
    }
}

// ---- set algebra ------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// The union of two trees.
    ///
    /// Under [`Strategy::Counting`] this is the multiset sum. Under
    /// [`Strategy::Grouping`] a key occurring in both trees contributes the
    /// second operand's run of duplicates.
    pub fn union(&self, other: &Tree<K, V>, strategy: Strategy) -> Tree<K, V> {
        merge::merge(self, other, MergeKind::Union, strategy)
    }

    /// The elements of `self` whose keys also occur in `other`; counting
    /// matches positionally, grouping keeps a matched key's whole run.
    pub fn intersection(&self, other: &Tree<K, V>, strategy: Strategy) -> Tree<K, V> {
        merge::merge(self, other, MergeKind::Intersection, strategy)
    }

    /// The elements of `self` left after removing matches from `other`.
    pub fn difference(&self, other: &Tree<K, V>, strategy: Strategy) -> Tree<K, V> {
        merge::merge(self, other, MergeKind::Difference, strategy)
    }

    /// The elements of either tree that have no match in the other.
    pub fn symmetric_difference(&self, other: &Tree<K, V>, strategy: Strategy) -> Tree<K, V> {
        merge::merge(self, other, MergeKind::SymmetricDifference, strategy)
    }

    /// Union with a sorted sequence of elements.
    pub fn union_with_sorted<I>(&self, sequence: I, strategy: Strategy) -> Tree<K, V>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        merge::merge_with_sorted(self, sequence, MergeKind::Union, strategy)
    }

    /// Symmetric difference with a sorted sequence of elements.
    pub fn symmetric_difference_with_sorted<I>(
        &self,
        sequence: I,
        strategy: Strategy,
    ) -> Tree<K, V>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        merge::merge_with_sorted(self, sequence, MergeKind::SymmetricDifference, strategy)
    }

    /// The elements whose keys occur in a sorted sequence of keys.
    pub fn intersection_with_sorted_keys<I>(&self, keys: I, strategy: Strategy) -> Tree<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        merge::merge_with_sorted_keys(self, keys, MergeKind::Intersection, strategy)
    }

    /// The elements left after striking out a sorted sequence of keys.
    pub fn subtracting_sorted_keys<I>(&self, keys: I, strategy: Strategy) -> Tree<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        merge::merge_with_sorted_keys(self, keys, MergeKind::Difference, strategy)
    }
}

// ---- predicates -------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Element-wise equality, with shared regions recognized by node
    /// identity and skipped without comparisons.
    pub fn elements_equal(&self, other: &Tree<K, V>) -> bool
    where
        V: PartialEq,
    {
        merge::elements_equal(self, other)
    }

    /// Whether no key occurs in both trees.
    pub fn is_disjoint(&self, other: &Tree<K, V>) -> bool {
        merge::is_disjoint(self, other)
    }

    /// Whether every key of `self` occurs in `other`; under
    /// [`Strategy::Counting`] with at least the same multiplicity.
    pub fn is_subset(&self, other: &Tree<K, V>, strategy: Strategy) -> bool {
        merge::subset_relation(self, other, strategy).0
    }

    pub fn is_strict_subset(&self, other: &Tree<K, V>, strategy: Strategy) -> bool {
        let (subset, proper) = merge::subset_relation(self, other, strategy);
        subset && proper
    }

    pub fn is_superset(&self, other: &Tree<K, V>, strategy: Strategy) -> bool {
        other.is_subset(self, strategy)
    }

    pub fn is_strict_superset(&self, other: &Tree<K, V>, strategy: Strategy) -> bool {
        other.is_strict_subset(self, strategy)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> PartialEq for Tree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.elements_equal(other)
    }
}

// ---- iteration glue ---------------------------------------------------

impl<'a, K, V> IntoIterator for &'a Tree<K, V> {
    type Item = &'a (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K: Clone, V: Clone> IntoIterator for Tree<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter::new(self.root)
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for Tree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ---- validation -------------------------------------------------------

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    /// Checks every structural invariant of the tree and panics on the
    /// first violation. Test and debugging aid.
    pub fn assert_correctness(&self) {
        self.root.assert_correctness();
    }
}
