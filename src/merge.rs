//! Set algebra over pairs of trees and over a tree and a sorted sequence.
//!
//! The engine is a symmetric two-pointer walk over strong paths, emitting
//! into a [`Builder`], so the output comes out maximally packed in one
//! linear pass. Runs of equal keys are resolved by the chosen [`Strategy`],
//! and regions where both operands share the very same nodes are recognized
//! by pointer identity and handled in O(depth) without visiting a single
//! element.

use std::rc::Rc;

use crate::builder::Builder;
use crate::node::Node;
use crate::path::StrongPath;
use crate::tree::Tree;

/// How runs of duplicate keys in the two operands are matched against each
/// other.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Strategy {
    /// A run of equal keys matches a run in the other operand as one group.
    /// For a union, the second operand's group replaces the first's.
    Grouping,
    /// Equal keys match positionally: `n` copies against `m` copies pair up
    /// `min(n, m)` times and the overshoot is left over.
    Counting,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MergeKind {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

use MergeKind::*;
use Strategy::*;

/// Merges two trees into a fresh one according to `kind` and `strategy`.
/// Linear in the output in the worst case; shared subtrees are appended or
/// dropped wholesale.
pub(crate) fn merge<K: Ord + Clone, V: Clone>(
    a: &Tree<K, V>,
    b: &Tree<K, V>,
    kind: MergeKind,
    strategy: Strategy,
) -> Tree<K, V> {
    let order = a.order();
    let mut out = Builder::packed(order);
    let mut pa = StrongPath::at_start(a.shared_root());
    let mut pb = StrongPath::at_start(b.shared_root());
    loop {
        if pa.is_at_end() {
            match kind {
                Union | SymmetricDifference => append_rest(&mut out, pb),
                Intersection | Difference => {}
            }
            break;
        }
        if pb.is_at_end() {
            match kind {
                Union | Difference | SymmetricDifference => append_rest(&mut out, pa),
                Intersection => {}
            }
            break;
        }
        if let Some(shared) = shared_subtree(&pa, &pb) {
            if skippable(&shared, kind, strategy, &pa, &pb) {
                match kind {
                    Union | Intersection => {
                        out.push_tree(Tree::from_shared_root(shared.clone()))
                    }
                    Difference | SymmetricDifference => {}
                }
                let skip = shared.count;
                let target_a = pa.offset() + skip;
                let target_b = pb.offset() + skip;
                pa.move_to_offset(target_a);
                pb.move_to_offset(target_b);
                continue;
            }
        }
        let ordering = pa.element().0.cmp(&pb.element().0);
        match ordering {
            std::cmp::Ordering::Less => {
                if let Union | Difference | SymmetricDifference = kind {
                    out.push(pa.element().clone());
                }
                pa.move_forward();
            }
            std::cmp::Ordering::Greater => {
                if let Union | SymmetricDifference = kind {
                    out.push(pb.element().clone());
                }
                pb.move_forward();
            }
            std::cmp::Ordering::Equal => {
                merge_runs(&mut out, &mut pa, &mut pb, kind, strategy);
            }
        }
    }
    out.finish()
}

/// Resolves one pair of equal-key runs according to the action table.
fn merge_runs<K: Ord + Clone, V: Clone>(
    out: &mut Builder<K, V>,
    pa: &mut StrongPath<K, V>,
    pb: &mut StrongPath<K, V>,
    kind: MergeKind,
    strategy: Strategy,
) {
    match (kind, strategy) {
        (Union, Grouping) => {
            // Ties keep the second operand's group.
            take_run(pa, |_, _| {});
            take_run(pb, |e, _| out.push(e.clone()));
        }
        (Union, Counting) => {
            take_run(pa, |e, _| out.push(e.clone()));
            take_run(pb, |e, _| out.push(e.clone()));
        }
        (Intersection, Grouping) => {
            take_run(pa, |e, _| out.push(e.clone()));
            take_run(pb, |_, _| {});
        }
        (Intersection, Counting) => {
            let keep = run_len(pa).min(run_len(pb));
            take_run(pa, |e, i| {
                if i < keep {
                    out.push(e.clone());
                }
            });
            take_run(pb, |_, _| {});
        }
        (Difference, Grouping) | (SymmetricDifference, Grouping) => {
            take_run(pa, |_, _| {});
            take_run(pb, |_, _| {});
        }
        (Difference, Counting) => {
            let matched = run_len(pb);
            take_run(pa, |e, i| {
                if i >= matched {
                    out.push(e.clone());
                }
            });
            take_run(pb, |_, _| {});
        }
        (SymmetricDifference, Counting) => {
            let na = run_len(pa);
            let nb = run_len(pb);
            take_run(pa, |e, i| {
                if i >= nb {
                    out.push(e.clone());
                }
            });
            take_run(pb, |e, i| {
                if i >= na {
                    out.push(e.clone());
                }
            });
        }
    }
}

/// Advances the path past the current run of equal keys, handing every
/// element and its index within the run to `f`.
fn take_run<K: Ord + Clone, V: Clone, F>(path: &mut StrongPath<K, V>, mut f: F)
where
    F: FnMut(&(K, V), usize),
{
    let key = path.element().0.clone();
    let mut index = 0;
    while !path.is_at_end() {
        {
            let element = path.element();
            if element.0 != key {
                return;
            }
            f(element, index);
        }
        index += 1;
        path.move_forward();
    }
}

/// The length of the current run of equal keys, without moving the path.
fn run_len<K: Ord + Clone, V: Clone>(path: &StrongPath<K, V>) -> usize {
    let mut probe = path.clone();
    take_run(&mut probe, |_, _| {});
    probe.offset() - path.offset()
}

/// Appends the current element and everything after it, if anything is left.
fn append_rest<K: Ord + Clone, V: Clone>(out: &mut Builder<K, V>, path: StrongPath<K, V>) {
    if path.is_at_end() {
        return;
    }
    out.push(path.element().clone());
    out.push_tree(path.suffix());
}

/// The largest subtree that both paths sit at the start of and that is the
/// very same node in both trees.
fn shared_subtree<K: Clone, V: Clone>(
    pa: &StrongPath<K, V>,
    pb: &StrongPath<K, V>,
) -> Option<Rc<Node<K, V>>> {
    let chain_a = pa.start_aligned_chain();
    let chain_b = pb.start_aligned_chain();
    // Both chains run leaf-first, so entries of equal index have equal depth.
    let overlap = chain_a.len().min(chain_b.len());
    for i in (0..overlap).rev() {
        if Rc::ptr_eq(chain_a[i], chain_b[i]) {
            return Some(chain_a[i].clone());
        }
    }
    None
}

/// Whether a shared subtree may be handled wholesale. Counting kinds always
/// may (the matched copies cancel arithmetically), except for a counting
/// union, which has to interleave the doubled elements. Grouping kinds must
/// not skip when the subtree's final run continues past its edge on either
/// side, because the group's resolution depends on the whole run.
fn skippable<K: Ord + Clone, V: Clone>(
    shared: &Rc<Node<K, V>>,
    kind: MergeKind,
    strategy: Strategy,
    pa: &StrongPath<K, V>,
    pb: &StrongPath<K, V>,
) -> bool {
    match strategy {
        Counting => kind != Union,
        Grouping => {
            let last = last_key(shared);
            !run_continues_past(pa, shared.count, last)
                && !run_continues_past(pb, shared.count, last)
        }
    }
}

fn last_key<K, V>(node: &Rc<Node<K, V>>) -> &K {
    let mut node: &Node<K, V> = node;
    loop {
        if node.is_leaf() {
            return &node.elements.last().expect("empty node on a path").0;
        }
        node = node.children.last().expect("internal node without children");
    }
}

fn run_continues_past<K: Ord + Clone, V: Clone>(
    path: &StrongPath<K, V>,
    skip: usize,
    key: &K,
) -> bool {
    let mut probe = path.clone();
    probe.move_to_offset(path.offset() + skip);
    !probe.is_at_end() && probe.element().0 == *key
}

// ---- the sorted-sequence degenerate case ----------------------------

/// Merges a tree with a sorted sequence of elements. Only `Union` and
/// `SymmetricDifference` ever emit from the sequence side, so this is the
/// variant that needs full elements on the right.
pub(crate) fn merge_with_sorted<K, V, I>(
    tree: &Tree<K, V>,
    sequence: I,
    kind: MergeKind,
    strategy: Strategy,
) -> Tree<K, V>
where
    K: Ord + Clone,
    V: Clone,
    I: IntoIterator<Item = (K, V)>,
{
    let mut out = Builder::packed(tree.order());
    let mut pa = StrongPath::at_start(tree.shared_root());
    let mut seq = sequence.into_iter().peekable();
    loop {
        if pa.is_at_end() {
            if let Union | SymmetricDifference = kind {
                for element in seq {
                    out.push(element);
                }
            }
            break;
        }
        let step = match seq.peek() {
            None => {
                if let Union | Difference | SymmetricDifference = kind {
                    append_rest(&mut out, pa);
                }
                break;
            }
            Some(next) => pa.element().0.cmp(&next.0),
        };
        match step {
            std::cmp::Ordering::Less => {
                if let Union | Difference | SymmetricDifference = kind {
                    out.push(pa.element().clone());
                }
                pa.move_forward();
            }
            std::cmp::Ordering::Greater => {
                let element = seq.next().expect("peeked element vanished");
                if let Union | SymmetricDifference = kind {
                    out.push(element);
                }
            }
            std::cmp::Ordering::Equal => {
                let key = pa.element().0.clone();
                let run_b = drain_seq_run(&mut seq, &key);
                merge_seq_runs(&mut out, &mut pa, run_b, kind, strategy);
            }
        }
    }
    out.finish()
}

/// Merges a tree with a sorted sequence of bare keys. Only meaningful for
/// the kinds that never emit from the right side.
pub(crate) fn merge_with_sorted_keys<K, V, I>(
    tree: &Tree<K, V>,
    keys: I,
    kind: MergeKind,
    strategy: Strategy,
) -> Tree<K, V>
where
    K: Ord + Clone,
    V: Clone,
    I: IntoIterator<Item = K>,
{
    debug_assert!(matches!(kind, Intersection | Difference));
    let mut out = Builder::packed(tree.order());
    let mut pa = StrongPath::at_start(tree.shared_root());
    let mut seq = keys.into_iter().peekable();
    loop {
        if pa.is_at_end() {
            break;
        }
        let step = match seq.peek() {
            None => {
                if kind == Difference {
                    append_rest(&mut out, pa);
                }
                break;
            }
            Some(next) => pa.element().0.cmp(next),
        };
        match step {
            std::cmp::Ordering::Less => {
                if kind == Difference {
                    out.push(pa.element().clone());
                }
                pa.move_forward();
            }
            std::cmp::Ordering::Greater => {
                seq.next();
            }
            std::cmp::Ordering::Equal => {
                let key = pa.element().0.clone();
                let mut matched = 0;
                while seq.peek() == Some(&key) {
                    seq.next();
                    matched += 1;
                }
                match (kind, strategy) {
                    (Intersection, Grouping) => take_run(&mut pa, |e, _| out.push(e.clone())),
                    (Intersection, Counting) => {
                        let keep = run_len(&pa).min(matched);
                        take_run(&mut pa, |e, i| {
                            if i < keep {
                                out.push(e.clone());
                            }
                        });
                    }
                    (Difference, Grouping) => take_run(&mut pa, |_, _| {}),
                    (Difference, Counting) => take_run(&mut pa, |e, i| {
                        if i >= matched {
                            out.push(e.clone());
                        }
                    }),
                    _ => unreachable!("key-only merge is intersection or difference"),
                }
            }
        }
    }
    out.finish()
}

fn drain_seq_run<K: Ord, V, I>(
    seq: &mut std::iter::Peekable<I>,
    key: &K,
) -> Vec<(K, V)>
where
    I: Iterator<Item = (K, V)>,
{
    let mut run = Vec::new();
    while seq.peek().map_or(false, |(k, _)| k == key) {
        run.push(seq.next().expect("peeked element vanished"));
    }
    run
}

fn merge_seq_runs<K: Ord + Clone, V: Clone>(
    out: &mut Builder<K, V>,
    pa: &mut StrongPath<K, V>,
    run_b: Vec<(K, V)>,
    kind: MergeKind,
    strategy: Strategy,
) {
    match (kind, strategy) {
        (Union, Grouping) => {
            take_run(pa, |_, _| {});
            for element in run_b {
                out.push(element);
            }
        }
        (Union, Counting) => {
            take_run(pa, |e, _| out.push(e.clone()));
            for element in run_b {
                out.push(element);
            }
        }
        (Intersection, Grouping) => take_run(pa, |e, _| out.push(e.clone())),
        (Intersection, Counting) => {
            let keep = run_len(pa).min(run_b.len());
            take_run(pa, |e, i| {
                if i < keep {
                    out.push(e.clone());
                }
            });
        }
        (Difference, Grouping) | (SymmetricDifference, Grouping) => {
            take_run(pa, |_, _| {});
        }
        (Difference, Counting) => {
            let matched = run_b.len();
            take_run(pa, |e, i| {
                if i >= matched {
                    out.push(e.clone());
                }
            });
        }
        (SymmetricDifference, Counting) => {
            let na = run_len(pa);
            let nb = run_b.len();
            take_run(pa, |e, i| {
                if i >= nb {
                    out.push(e.clone());
                }
            });
            for element in run_b.into_iter().skip(na) {
                out.push(element);
            }
        }
    }
}

// ---- comparison predicates ------------------------------------------

/// Element-wise equality of two trees, shared regions skipped by identity.
pub(crate) fn elements_equal<K, V>(a: &Tree<K, V>, b: &Tree<K, V>) -> bool
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    if Rc::ptr_eq(&a.shared_root(), &b.shared_root()) {
        return true;
    }
    if a.len() != b.len() {
        return false;
    }
    let mut pa = StrongPath::at_start(a.shared_root());
    let mut pb = StrongPath::at_start(b.shared_root());
    while !pa.is_at_end() {
        if let Some(shared) = shared_subtree(&pa, &pb) {
            let skip = shared.count;
            let target_a = pa.offset() + skip;
            let target_b = pb.offset() + skip;
            pa.move_to_offset(target_a);
            pb.move_to_offset(target_b);
            continue;
        }
        if pa.element() != pb.element() {
            return false;
        }
        pa.move_forward();
        pb.move_forward();
    }
    true
}

/// Whether the key sets of the two trees have no key in common.
pub(crate) fn is_disjoint<K: Ord + Clone, V: Clone>(a: &Tree<K, V>, b: &Tree<K, V>) -> bool {
    let mut pa = StrongPath::at_start(a.shared_root());
    let mut pb = StrongPath::at_start(b.shared_root());
    while !pa.is_at_end() && !pb.is_at_end() {
        if shared_subtree(&pa, &pb).is_some() {
            // The same node holds the same keys on both sides.
            return false;
        }
        match pa.element().0.cmp(&pb.element().0) {
            std::cmp::Ordering::Less => pa.move_forward(),
            std::cmp::Ordering::Greater => pb.move_forward(),
            std::cmp::Ordering::Equal => return false,
        }
    }
    true
}

/// Key-level inclusion of `a` in `b`. Under `Grouping` multiplicities are
/// ignored; under `Counting` every key of `a` must appear in `b` at least
/// as many times. Returns the inclusion and whether it is proper.
pub(crate) fn subset_relation<K: Ord + Clone, V: Clone>(
    a: &Tree<K, V>,
    b: &Tree<K, V>,
    strategy: Strategy,
) -> (bool, bool) {
    let mut pa = StrongPath::at_start(a.shared_root());
    let mut pb = StrongPath::at_start(b.shared_root());
    let mut proper = false;
    loop {
        if pa.is_at_end() {
            proper |= !pb.is_at_end();
            return (true, proper);
        }
        if pb.is_at_end() {
            return (false, proper);
        }
        if let Some(shared) = shared_subtree(&pa, &pb) {
            if skippable(&shared, Intersection, strategy, &pa, &pb) {
                let skip = shared.count;
                let target_a = pa.offset() + skip;
                let target_b = pb.offset() + skip;
                pa.move_to_offset(target_a);
                pb.move_to_offset(target_b);
                continue;
            }
        }
        match pa.element().0.cmp(&pb.element().0) {
            std::cmp::Ordering::Less => return (false, proper),
            std::cmp::Ordering::Greater => {
                proper = true;
                take_run(&mut pb, |_, _| {});
            }
            std::cmp::Ordering::Equal => {
                let na = run_len(&pa);
                let nb = run_len(&pb);
                if strategy == Counting {
                    if na > nb {
                        return (false, proper);
                    }
                    proper |= na < nb;
                }
                take_run(&mut pa, |_, _| {});
                take_run(&mut pb, |_, _| {});
            }
        }
    }
}
