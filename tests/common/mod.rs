//! Shared harness: a `Vec`-backed reference model of the tree, random round
//! actions, and model implementations of the set algebra for both
//! strategies.

use copse::{Selector, Strategy, Tree};
use std::ops::Range;

pub type Element = (i32, i32);
pub type Model = Vec<Element>;

/// Something to perform in one round of tests.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RoundAction {
    Insert { key: i32, value: i32 },
    InsertOrReplace { key: i32, value: i32 },
    RemoveKey { key: i32 },
    RemoveAtOffset { index: usize },
    RemoveRange { range: Range<usize> },
    Slice { range: Range<usize> },
}

/// Stable by-key insertion into the model: a duplicate key goes after its
/// existing equals, mirroring `Tree::insert`.
pub fn model_insert(model: &mut Model, element: Element) {
    let at = model.partition_point(|(k, _)| *k <= element.0);
    model.insert(at, element);
}

pub fn model_remove_key(model: &mut Model, key: i32) -> Option<Element> {
    let at = model.iter().position(|(k, _)| *k == key)?;
    Some(model.remove(at))
}

/// Applies one action to both the tree and the model and checks that they
/// agree afterwards.
pub fn apply_and_check(tree: &mut Tree<i32, i32>, model: &mut Model, action: &RoundAction) {
    match action {
        RoundAction::Insert { key, value } => {
            tree.insert((*key, *value));
            model_insert(model, (*key, *value));
        }
        RoundAction::InsertOrReplace { key, value } => {
            let replaced = tree.insert_or_replace((*key, *value));
            let expected = match model.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, *value)),
                None => {
                    model_insert(model, (*key, *value));
                    None
                }
            };
            assert_eq!(replaced, expected);
        }
        RoundAction::RemoveKey { key } => {
            let removed = tree.remove(key, Selector::First);
            let expected = model_remove_key(model, *key);
            assert_eq!(removed, expected);
        }
        RoundAction::RemoveAtOffset { index } => {
            if *index < model.len() {
                let removed = tree.remove_at_offset(*index);
                let expected = model.remove(*index);
                assert_eq!(removed, expected);
            }
        }
        RoundAction::RemoveRange { range } => {
            let range = clamp(range, model.len());
            tree.remove_range(range.clone());
            model.drain(range);
        }
        RoundAction::Slice { range } => {
            let range = clamp(range, model.len());
            let slice = tree.subrange_by_offsets(range.clone());
            slice.assert_correctness();
            assert_eq!(to_vec(&slice), model[range].to_vec());
        }
    }
    tree.assert_correctness();
    assert_eq!(tree.len(), model.len());
    assert_eq!(to_vec(tree), *model);
}

fn clamp(range: &Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

pub fn to_vec(tree: &Tree<i32, i32>) -> Model {
    tree.iter().cloned().collect()
}

pub fn tree_of(keys: &[i32], order: usize) -> Tree<i32, i32> {
    let mut tree = Tree::new(order);
    for (occurrence, key) in keys.iter().enumerate() {
        tree.insert((*key, occurrence as i32));
    }
    tree
}

pub fn keys_of(tree: &Tree<i32, i32>) -> Vec<i32> {
    tree.iter().map(|(k, _)| *k).collect()
}

// ---- model set algebra ------------------------------------------------

fn runs(sorted: &Model) -> Vec<(i32, Vec<Element>)> {
    let mut out: Vec<(i32, Vec<Element>)> = Vec::new();
    for element in sorted {
        match out.last_mut() {
            Some((key, run)) if *key == element.0 => run.push(*element),
            _ => out.push((element.0, vec![*element])),
        }
    }
    out
}

fn merge_model<F>(a: &Model, b: &Model, mut resolve: F) -> Model
where
    F: FnMut(Option<&[Element]>, Option<&[Element]>) -> Vec<Element>,
{
    let ra = runs(a);
    let rb = runs(b);
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < ra.len() || j < rb.len() {
        let which = match (ra.get(i), rb.get(j)) {
            (Some((ka, _)), Some((kb, _))) => ka.cmp(kb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => unreachable!(),
        };
        match which {
            std::cmp::Ordering::Less => {
                out.extend(resolve(Some(&ra[i].1), None));
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.extend(resolve(None, Some(&rb[j].1)));
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.extend(resolve(Some(&ra[i].1), Some(&rb[j].1)));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

pub fn model_union(a: &Model, b: &Model, strategy: Strategy) -> Model {
    merge_model(a, b, |ra, rb| match (ra, rb, strategy) {
        (Some(ra), None, _) => ra.to_vec(),
        (None, Some(rb), _) => rb.to_vec(),
        // Ties keep the second operand's group.
        (Some(_), Some(rb), Strategy::Grouping) => rb.to_vec(),
        (Some(ra), Some(rb), Strategy::Counting) => {
            let mut run = ra.to_vec();
            run.extend_from_slice(rb);
            run
        }
        (None, None, _) => unreachable!(),
    })
}

pub fn model_intersection(a: &Model, b: &Model, strategy: Strategy) -> Model {
    merge_model(a, b, |ra, rb| match (ra, rb, strategy) {
        (Some(ra), Some(_), Strategy::Grouping) => ra.to_vec(),
        (Some(ra), Some(rb), Strategy::Counting) => ra[..ra.len().min(rb.len())].to_vec(),
        _ => Vec::new(),
    })
}

pub fn model_difference(a: &Model, b: &Model, strategy: Strategy) -> Model {
    merge_model(a, b, |ra, rb| match (ra, rb, strategy) {
        (Some(ra), None, _) => ra.to_vec(),
        (Some(_), Some(_), Strategy::Grouping) => Vec::new(),
        (Some(ra), Some(rb), Strategy::Counting) => ra[rb.len().min(ra.len())..].to_vec(),
        _ => Vec::new(),
    })
}

pub fn model_symmetric_difference(a: &Model, b: &Model, strategy: Strategy) -> Model {
    merge_model(a, b, |ra, rb| match (ra, rb, strategy) {
        (Some(ra), None, _) => ra.to_vec(),
        (None, Some(rb), _) => rb.to_vec(),
        (Some(_), Some(_), Strategy::Grouping) => Vec::new(),
        (Some(ra), Some(rb), Strategy::Counting) => {
            if ra.len() >= rb.len() {
                ra[rb.len()..].to_vec()
            } else {
                rb[ra.len()..].to_vec()
            }
        }
        (None, None, _) => unreachable!(),
    })
}
