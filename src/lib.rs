//! Copse is a library of value-semantic, copy-on-write B-trees.
//!
//! A [`Tree`] is an ordered collection of `(key, value)` elements with full
//! value semantics: cloning a tree is O(1), and the clones share their nodes
//! until one of them is edited, at which point only the nodes on the edited
//! path are copied. On top of that sharing discipline the crate provides
//! sub-linear bulk operations:
//!
//! * concatenation and slicing in O(log n) through join/split surgery,
//! * linear-time loading of sorted input into a maximally packed tree,
//! * set algebra (union, intersection, difference, symmetric difference)
//!   over pairs of trees that recognizes shared subtrees by node identity
//!   and handles them without visiting their elements.
//!
//! Duplicate keys are allowed and keep their insertion order; lookups
//! disambiguate them with a [`Selector`], set algebra with a [`Strategy`].
//!
//! Point edits and amortized-O(1) sequential edits go through a scoped
//! [`Cursor`], obtained from the `with_cursor_*` methods on [`Tree`]:
//!
//! ```
//! use copse::Tree;
//!
//! let mut tree: Tree<u32, String> = Tree::new(5);
//! tree.with_cursor_at_start(|cursor| {
//!     for k in 0..100 {
//!         cursor.insert((k, k.to_string()));
//!     }
//! });
//! assert_eq!(tree.len(), 100);
//! assert_eq!(tree.value_of(&42, copse::Selector::Any).unwrap(), "42");
//! ```
//!
//! The tree is a single-threaded value; it uses plain reference counting
//! and is neither `Send` nor `Sync`. Mutating one tree value concurrently
//! with any access to it is ruled out by the borrow rules; clones are
//! independent values and never observe each other's edits.

#[macro_use]
extern crate derive_destructure;

mod builder;
mod cursor;
mod iterators;
mod merge;
mod node;
mod path;
mod surgery;
mod tree;

pub use cursor::Cursor;
pub use iterators::{IntoIter, Iter};
pub use merge::Strategy;
pub use node::Selector;
pub use tree::{Index, Tree};
