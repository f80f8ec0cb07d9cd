//! Iterators over trees.
//!
//! The borrowing iterator rides a [`WeakPath`]; the owning one a
//! [`StrongPath`], so it keeps the nodes alive by itself. Both are lazy,
//! finite and double-ended, walking a front and a back path toward each
//! other; restarting means building a fresh iterator from the same root.

use std::rc::Rc;

use crate::node::Node;
use crate::path::{Path, StrongPath, WeakPath};

/// Borrowing in-order iterator over a tree's elements.
pub struct Iter<'a, K, V> {
    front: WeakPath<'a, K, V>,
    back: WeakPath<'a, K, V>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(root: &'a Node<K, V>, offset: usize) -> Self {
        Iter {
            front: WeakPath::at_offset(root, offset),
            back: WeakPath::at_end(root),
        }
    }

    pub(crate) fn from_path(front: WeakPath<'a, K, V>) -> Self {
        let mut back = front.clone();
        let count = back.count();
        back.move_to_offset(count);
        Iter { front, back }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a (K, V);

    fn next(&mut self) -> Option<&'a (K, V)> {
        if self.front.offset() >= self.back.offset() {
            return None;
        }
        let element = self.front.element_detached();
        self.front.move_forward();
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.offset() - self.front.offset();
        (remaining, Some(remaining))
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<&'a (K, V)> {
        if self.front.offset() >= self.back.offset() {
            return None;
        }
        self.back.move_backward();
        Some(self.back.element_detached())
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}
impl<'a, K, V> std::iter::FusedIterator for Iter<'a, K, V> {}

/// Owning in-order iterator. Elements are cloned out of the nodes, since
/// the nodes themselves may still be shared with other tree versions.
pub struct IntoIter<K, V> {
    front: StrongPath<K, V>,
    back: StrongPath<K, V>,
}

impl<K, V> IntoIter<K, V> {
    pub(crate) fn new(root: Rc<Node<K, V>>) -> Self {
        IntoIter {
            front: Path::at_offset(root.clone(), 0),
            back: Path::at_end(root),
        }
    }
}

impl<K: Clone, V: Clone> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.front.offset() >= self.back.offset() {
            return None;
        }
        let element = self.front.element().clone();
        self.front.move_forward();
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.offset() - self.front.offset();
        (remaining, Some(remaining))
    }
}

impl<K: Clone, V: Clone> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<(K, V)> {
        if self.front.offset() >= self.back.offset() {
            return None;
        }
        self.back.move_backward();
        Some(self.back.element().clone())
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for IntoIter<K, V> {}
impl<K: Clone, V: Clone> std::iter::FusedIterator for IntoIter<K, V> {}
