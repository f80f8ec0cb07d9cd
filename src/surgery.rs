//! Structural surgery: joining two trees around a separator, concatenating
//! trees, and cutting a tree at a position.
//!
//! These are the sub-linear primitives everything bulk is built from. None
//! of them compare keys; they only rebalance, so the caller is responsible
//! for handing in operands that are ordered relative to each other.

use std::rc::Rc;

use crate::node::{max_keys, Node, Splinter};
use crate::path::StrongPath;
use crate::tree::Tree;

/// Produces a balanced tree containing `left ++ [separator] ++ right` in
/// O(|depth(left) - depth(right)| + 1).
///
/// Either side may be arbitrarily small; an empty or otherwise deficient
/// root simply becomes a deficient child at its depth and is repaired by the
/// usual rebalancing. Copy-on-write cloning touches only the spine that the
/// smaller tree is hung onto.
pub(crate) fn join<K: Clone, V: Clone>(
    left: Tree<K, V>,
    separator: (K, V),
    right: Tree<K, V>,
) -> Tree<K, V> {
    let order = left.order();
    debug_assert_eq!(order, right.order(), "joining trees of different orders");
    let left_depth = left.depth();
    let right_depth = right.depth();
    use std::cmp::Ordering::*;
    match left_depth.cmp(&right_depth) {
        Equal => {
            let left_root = left.into_unique_root();
            let right_root = right.into_unique_root();
            join_roots(left_root, separator, right_root)
        }
        Greater => {
            let mut root = left.into_unique_root();
            let overflow =
                attach_right(&mut root, separator, right.into_shared_root(), right_depth);
            finish_root(root, overflow, order)
        }
        Less => {
            let mut root = right.into_unique_root();
            let overflow =
                attach_left(&mut root, separator, left.into_shared_root(), left_depth);
            finish_root(root, overflow, order)
        }
    }
}

/// Joins two trees of equal depth. Merges them into a single node when the
/// combined size fits, otherwise makes them siblings under a fresh root and
/// rebalances whichever side came in deficient.
fn join_roots<K: Clone, V: Clone>(
    mut left: Node<K, V>,
    separator: (K, V),
    mut right: Node<K, V>,
) -> Tree<K, V> {
    let order = left.order;
    if left.elements.len() + 1 + right.elements.len() <= max_keys(order) {
        left.elements.push(separator);
        left.elements.append(&mut right.elements);
        left.children.append(&mut right.children);
        left.recount();
        return Tree::from_root(left);
    }
    let depth = left.depth + 1;
    let mut root = Node::internal_shell(order, depth);
    root.elements.push(separator);
    root.children.push(Rc::new(left));
    root.children.push(Rc::new(right));
    // The combined size exceeds a node, so a deficient side can always be
    // refilled by rotation; no collapse is reachable from here.
    if root.children[0].is_deficient() {
        root.fix_deficiency(0);
    }
    if root.children[1].is_deficient() {
        root.fix_deficiency(1);
    }
    root.recount();
    Tree::from_root(root)
}

/// Hangs `sub` (of depth `sub_depth`) onto the rightmost spine of `node`,
/// with `separator` between. Returns a splinter when `node` itself splits.
fn attach_right<K: Clone, V: Clone>(
    node: &mut Node<K, V>,
    separator: (K, V),
    sub: Rc<Node<K, V>>,
    sub_depth: usize,
) -> Option<Splinter<K, V>> {
    if node.depth == sub_depth + 1 {
        node.elements.push(separator);
        node.children.push(sub);
        let slot = node.children.len() - 1;
        node.fix_deficiency(slot);
    } else {
        let last = node.children.len() - 1;
        let child = node.make_child_unique(last);
        if let Some(splinter) = attach_right(child, separator, sub, sub_depth) {
            node.elements.push(splinter.separator);
            node.children.push(Rc::new(splinter.right));
        }
    }
    node.recount();
    if node.is_over_full() {
        Some(node.split())
    } else {
        None
    }
}

/// Mirror image of [`attach_right`]: hangs `sub` onto the leftmost spine.
fn attach_left<K: Clone, V: Clone>(
    node: &mut Node<K, V>,
    separator: (K, V),
    sub: Rc<Node<K, V>>,
    sub_depth: usize,
) -> Option<Splinter<K, V>> {
    if node.depth == sub_depth + 1 {
        node.elements.insert(0, separator);
        node.children.insert(0, sub);
        node.fix_deficiency(0);
    } else {
        let child = node.make_child_unique(0);
        if let Some(splinter) = attach_left(child, separator, sub, sub_depth) {
            // The split left the old child as the left half, so the new
            // right half lands between it and the rest.
            node.elements.insert(0, splinter.separator);
            node.children.insert(1, Rc::new(splinter.right));
        }
    }
    node.recount();
    if node.is_over_full() {
        Some(node.split())
    } else {
        None
    }
}

/// Grows a new root level when an attachment split the old root.
fn finish_root<K: Clone, V: Clone>(
    root: Node<K, V>,
    overflow: Option<Splinter<K, V>>,
    order: usize,
) -> Tree<K, V> {
    match overflow {
        None => Tree::from_root(root),
        Some(splinter) => {
            let depth = root.depth + 1;
            let mut grown = Node::internal_shell(order, depth);
            grown.elements.push(splinter.separator);
            grown.children.push(Rc::new(root));
            grown.children.push(Rc::new(splinter.right));
            grown.recount();
            Tree::from_root(grown)
        }
    }
}

/// Concatenates two trees, with every element of `left` ordered before every
/// element of `right`. O(log n): the boundary element of the shorter-to-cut
/// side is stolen to serve as the join separator.
pub(crate) fn concat<K: Clone, V: Clone>(left: Tree<K, V>, right: Tree<K, V>) -> Tree<K, V> {
    if left.is_empty() {
        return right;
    }
    if right.is_empty() {
        return left;
    }
    let boundary = left.len() - 1;
    let path = StrongPath::at_offset(left.into_shared_root(), boundary);
    let (prefix, separator, rest) = path.split();
    debug_assert!(rest.is_empty());
    join(prefix, separator, right)
}

/// Cuts a tree into the elements before `offset` and the elements from
/// `offset` on. Both edges are fine: offset 0 or `len` yields an empty side.
pub(crate) fn split_pair<K: Clone, V: Clone>(
    tree: Tree<K, V>,
    offset: usize,
) -> (Tree<K, V>, Tree<K, V>) {
    let order = tree.order();
    if offset == 0 {
        return (Tree::new(order), tree);
    }
    if offset >= tree.len() {
        return (tree, Tree::new(order));
    }
    let path = StrongPath::at_offset(tree.into_shared_root(), offset);
    let (prefix, element, suffix) = path.split();
    (prefix, join(Tree::new(order), element, suffix))
}

/// Cuts out `range` as its own tree, returning `(before, middle, after)`.
pub(crate) fn split_triple<K: Clone, V: Clone>(
    tree: Tree<K, V>,
    range: std::ops::Range<usize>,
) -> (Tree<K, V>, Tree<K, V>, Tree<K, V>) {
    let (before, rest) = split_pair(tree, range.start);
    let (middle, after) = split_pair(rest, range.end - range.start);
    (before, middle, after)
}
