pub mod common;
pub use common::*;

use copse::{Selector, Strategy, Tree};

// ---- the concrete end-to-end scenarios --------------------------------

#[test]
fn builder_monotonic_load() {
    // 124 elements fill the order-5 tree of depth 2 exactly.
    let full = Tree::from_sorted((0..124).map(|k| (k, k.to_string())), 5, 4, false);
    full.assert_correctness();
    assert_eq!(full.depth(), 2);
    assert_eq!(full.len(), 124);

    // A load that does not land on a full tree still comes out packed and
    // valid at the same depth.
    let partial = Tree::from_sorted((0..63).map(|k| (k, k.to_string())), 5, 4, false);
    partial.assert_correctness();
    assert_eq!(partial.depth(), 2);
    assert_eq!(
        partial.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        (0..63).collect::<Vec<_>>()
    );
}

#[test]
fn split_join_round_trip() {
    let tree = Tree::from_sorted((0..125).map(|k| (k, k.to_string())), 5, 4, false);
    for cut in [0, 1, 62, 63, 64, 124, 125] {
        let prefix = tree.prefix_up_to(cut);
        let suffix = tree.suffix_from(cut);
        prefix.assert_correctness();
        suffix.assert_correctness();
        assert_eq!(prefix.len(), cut);
        assert_eq!(suffix.len(), 125 - cut);
        let rejoined: Vec<_> = prefix.iter().chain(suffix.iter()).cloned().collect();
        assert_eq!(rejoined, tree.iter().cloned().collect::<Vec<_>>());
    }
}

#[test]
fn union_grouping_keeps_second_operands_groups() {
    let a = tree_of(&[0, 0, 0, 0, 3, 4, 6, 6, 6, 6, 7, 7], 5);
    let b = tree_of(&[0, 0, 1, 1, 3, 3, 6, 8], 5);
    assert_eq!(
        keys_of(&a.union(&b, Strategy::Grouping)),
        vec![0, 0, 1, 1, 3, 3, 4, 6, 7, 7, 8]
    );
    assert_eq!(
        keys_of(&b.union(&a, Strategy::Grouping)),
        vec![0, 0, 0, 0, 1, 1, 3, 4, 6, 6, 6, 6, 7, 7, 8]
    );
}

#[test]
fn union_counting_is_the_multiset_sum() {
    let a = tree_of(&[0, 0, 0, 0, 3, 4, 6, 6, 6, 6, 7, 7], 5);
    let b = tree_of(&[0, 0, 1, 1, 3, 3, 6, 8], 5);
    let expected = vec![0, 0, 0, 0, 0, 0, 1, 1, 3, 3, 3, 4, 6, 6, 6, 6, 6, 7, 7, 8];
    assert_eq!(keys_of(&a.union(&b, Strategy::Counting)), expected);
    assert_eq!(keys_of(&b.union(&a, Strategy::Counting)), expected);
}

#[test]
fn intersection_counting_over_shared_subtrees() {
    let mut keys = Vec::new();
    for key in 0..10 {
        keys.extend(std::iter::repeat(key).take(20));
    }
    let a = tree_of(&keys, 5);
    let mut b = a.clone();
    b.with_cursor_at_key(&5, Selector::First, |cursor| cursor.remove_n(20));
    assert_eq!(b.len(), a.len() - 20);

    let both = a.intersection(&b, Strategy::Counting);
    both.assert_correctness();
    assert_eq!(both.len(), b.len());
    assert_eq!(keys_of(&both), keys_of(&b));
}

#[test]
fn cursor_insert_after_build() {
    let mut tree: Tree<i32, String> = Tree::new(5);
    tree.with_cursor_at_start(|cursor| {
        for k in 1..30 {
            cursor.insert_after((k, k.to_string()));
        }
        cursor.move_to_offset(0);
        cursor.insert((0, "0".to_string()));
    });
    tree.assert_correctness();
    assert_eq!(tree.len(), 30);
    for (offset, (key, value)) in tree.iter().enumerate() {
        assert_eq!(*key, offset as i32);
        assert_eq!(*value, key.to_string());
    }
}

#[test]
fn set_algebra_with_sorted_key_ranges() {
    let tree = Tree::from_sorted((0..10_000).map(|k| (k, ())), 9, 8, false);
    let kept = tree.intersection_with_sorted_keys(100..9_900, Strategy::Grouping);
    kept.assert_correctness();
    assert_eq!(
        kept.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        (100..9_900).collect::<Vec<_>>()
    );
    let removed = tree.subtracting_sorted_keys(100..9_900, Strategy::Grouping);
    removed.assert_correctness();
    let expected: Vec<i32> = (0..100).chain(9_900..10_000).collect();
    assert_eq!(removed.iter().map(|(k, _)| *k).collect::<Vec<_>>(), expected);

    // The same slices through the split/join fast path.
    let slice = tree.subrange_by_keys(100..9_900);
    assert!(slice.elements_equal(&kept));
}

// ---- boundary behaviors -----------------------------------------------

#[test]
fn empty_tree_behaviors() {
    let empty: Tree<i32, i32> = Tree::new(5);
    assert!(empty.is_empty());
    assert_eq!(empty.iter().count(), 0);
    assert_eq!(empty.first(), None);
    assert_eq!(empty.last(), None);
    assert!(empty.prefix(10).is_empty());
    assert!(empty.suffix(10).is_empty());
    assert!(empty.subrange_by_keys(1..100).is_empty());
    assert!(empty.union(&empty, Strategy::Counting).is_empty());
    assert!(empty.is_subset(&empty, Strategy::Counting));
    assert!(!empty.is_strict_subset(&empty, Strategy::Counting));
    assert!(empty.is_disjoint(&empty));

    let mut also_empty = empty.clone();
    assert_eq!(also_empty.pop_first(), None);
    assert_eq!(also_empty.pop_last(), None);
    also_empty.remove_range(3..17);
    assert!(also_empty.is_empty());
}

#[test]
fn single_element_tree() {
    let mut tree = Tree::new(5);
    tree.insert((7, "seven"));
    tree.assert_correctness();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.first(), Some(&(7, "seven")));
    assert_eq!(tree.value_of(&7, Selector::Any), Some(&"seven"));
    assert_eq!(tree.value_of(&8, Selector::Any), None);
    assert_eq!(tree.remove(&7, Selector::Any), Some((7, "seven")));
    assert!(tree.is_empty());
    tree.assert_correctness();
}

#[test]
fn depth_transitions_at_the_boundary() {
    let mut tree: Tree<i32, i32> = Tree::new(3);
    // Order 3 holds at most 2 elements in the root leaf.
    tree.insert((0, 0));
    tree.insert((1, 1));
    assert_eq!(tree.depth(), 0);
    tree.insert((2, 2));
    assert_eq!(tree.depth(), 1);
    tree.assert_correctness();
    tree.remove(&2, Selector::Any);
    assert_eq!(tree.depth(), 0);
    tree.assert_correctness();
}

#[test]
fn end_sentinel_offsets() {
    let mut tree = tree_of(&[1, 2, 3], 5);
    assert_eq!(tree.offset_of_key(&3, Selector::After), Some(3));
    assert!(tree.prefix_up_to(3).elements_equal(&tree));
    assert!(tree.suffix_from(3).is_empty());
    tree.with_cursor_at_end(|cursor| {
        assert!(cursor.is_at_end());
        assert_eq!(cursor.offset(), 3);
        cursor.insert((4, 99));
        assert!(cursor.is_at_end());
    });
    assert_eq!(keys_of(&tree), vec![1, 2, 3, 4]);
}

#[test]
fn key_ranges_past_either_end() {
    let tree = tree_of(&[10, 20, 30], 5);
    assert!(tree.subrange_by_keys(..).elements_equal(&tree));
    assert!(tree.subrange_by_keys(0..5).is_empty());
    assert!(tree.subrange_by_keys(40..90).is_empty());
    assert_eq!(keys_of(&tree.subrange_by_keys(15..=30)), vec![20, 30]);
    assert_eq!(keys_of(&tree.subrange_by_keys(..25)), vec![10, 20]);
    assert_eq!(keys_of(&tree.subrange_by_keys(10..)), vec![10, 20, 30]);
}

// ---- assorted facade behavior -----------------------------------------

#[test]
fn selectors_disambiguate_duplicates() {
    let mut tree = Tree::new(5);
    for (occurrence, key) in [1, 3, 3, 3, 5].iter().enumerate() {
        tree.insert((*key, occurrence as i32));
    }
    assert_eq!(tree.offset_of_key(&3, Selector::First), Some(1));
    assert_eq!(tree.offset_of_key(&3, Selector::Last), Some(3));
    assert_eq!(tree.offset_of_key(&3, Selector::After), Some(4));
    assert_eq!(tree.offset_of_key(&4, Selector::First), None);
    assert_eq!(tree.value_of(&3, Selector::First), Some(&1));
    assert_eq!(tree.value_of(&3, Selector::Last), Some(&3));

    // Stable insertion: a new duplicate lands after its equals.
    tree.insert((3, 9));
    assert_eq!(tree.offset_of_key(&3, Selector::Last), Some(4));
    assert_eq!(tree.value_of(&3, Selector::Last), Some(&9));
}

#[test]
fn insert_or_replace_and_find() {
    let mut tree = Tree::new(5);
    assert_eq!(tree.insert_or_replace((1, 10)), None);
    assert_eq!(tree.insert_or_replace((1, 11)), Some(10));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.insert_or_find((1, 99)), Some(11));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.insert_or_find((2, 20)), None);
    assert_eq!(tree.len(), 2);
}

#[test]
fn bulk_edits_against_the_model() {
    let mut tree = tree_of(&(0..200).collect::<Vec<_>>(), 5);
    let mut model = to_vec(&tree);

    let extracted = tree.extract_range(50..150);
    let expected: Model = model.drain(50..150).collect();
    tree.assert_correctness();
    extracted.assert_correctness();
    assert_eq!(to_vec(&extracted), expected);
    assert_eq!(to_vec(&tree), model);

    // Keys 10..15 fit between the remaining neighbors of the range.
    tree.replace_range(10..20, (10..15).map(|k| (k, -1)));
    tree.assert_correctness();
    assert_eq!(tree.len(), 95);

    let mut other = tree_of(&[5, 6], 5);
    other.insert_sequence_at_offset(2, (100..130).map(|k| (k, k)));
    other.assert_correctness();
    assert_eq!(other.len(), 32);
}

#[test]
fn value_semantics_between_versions() {
    let mut tree = tree_of(&(0..500).collect::<Vec<_>>(), 5);
    let snapshot = tree.clone();
    for k in 0..100 {
        tree.remove(&k, Selector::Any);
    }
    tree.insert((1000, 0));
    tree.assert_correctness();
    snapshot.assert_correctness();
    assert_eq!(snapshot.len(), 500);
    assert_eq!(tree.len(), 401);
    assert_eq!(keys_of(&snapshot), (0..500).collect::<Vec<_>>());
}

#[test]
fn cursor_scope_survives_a_panic() {
    let mut tree = tree_of(&(0..100).collect::<Vec<_>>(), 5);
    let result: Result<(), _> = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        tree.with_cursor_at_offset(40, |cursor| {
            cursor.insert((40, -1));
            cursor.remove();
            panic!("caller gave up mid-scope");
        })
    }));
    assert!(result.is_err());
    // The tree is still valid after the aborted scope.
    tree.assert_correctness();
    assert_eq!(tree.len(), 100);
}

#[test]
fn cursor_extract_and_trim() {
    let mut tree = tree_of(&(0..100).collect::<Vec<_>>(), 5);
    let middle = tree.with_cursor_at_offset(30, |cursor| {
        let middle = cursor.extract_n(40);
        assert_eq!(cursor.count(), 60);
        assert_eq!(cursor.offset(), 30);
        middle
    });
    middle.assert_correctness();
    tree.assert_correctness();
    assert_eq!(keys_of(&middle), (30..70).collect::<Vec<_>>());
    assert_eq!(
        keys_of(&tree),
        (0..30).chain(70..100).collect::<Vec<_>>()
    );

    tree.with_cursor_at_offset(10, |cursor| cursor.remove_all_before(false));
    assert_eq!(tree.len(), 50);
    tree.with_cursor_at_offset(20, |cursor| cursor.remove_all_after(true));
    assert_eq!(tree.len(), 20);
    tree.assert_correctness();
}

#[test]
fn iterators_from_positions() {
    let tree = tree_of(&(0..50).collect::<Vec<_>>(), 5);
    assert_eq!(tree.iter_from_offset(45).count(), 5);
    let from_key: Vec<i32> = tree
        .iter_from_key(&47, Selector::First)
        .map(|(k, _)| *k)
        .collect();
    assert_eq!(from_key, vec![47, 48, 49]);
    // An absent key starts iteration at its insertion position.
    let absent: Vec<i32> = tree_of(&[1, 5, 9], 5)
        .iter_from_key(&6, Selector::First)
        .map(|(k, _)| *k)
        .collect();
    assert_eq!(absent, vec![9]);

    let owned: Vec<(i32, i32)> = tree.clone().into_iter().collect();
    assert_eq!(owned, to_vec(&tree));
}

#[test]
fn iterators_run_both_ways() {
    let tree = tree_of(&(0..100).collect::<Vec<_>>(), 5);
    let reversed: Vec<i32> = tree.iter().rev().map(|(k, _)| *k).collect();
    assert_eq!(reversed, (0..100).rev().collect::<Vec<_>>());

    // Front and back meet in the middle without overlap.
    let mut iter = tree.iter();
    let mut collected = Vec::new();
    loop {
        match iter.next() {
            Some((k, _)) => collected.push(*k),
            None => break,
        }
        if let Some((k, _)) = iter.next_back() {
            collected.push(*k);
        }
    }
    collected.sort_unstable();
    assert_eq!(collected, (0..100).collect::<Vec<_>>());

    let owned_back: Vec<i32> = tree.clone().into_iter().rev().map(|(k, _)| k).collect();
    assert_eq!(owned_back, (0..100).rev().collect::<Vec<_>>());
}

#[test]
fn cursor_moves_by_key_mid_scope() {
    let mut tree = tree_of(&(0..200).map(|k| k * 2).collect::<Vec<_>>(), 5);
    tree.with_cursor_at_start(|cursor| {
        cursor.move_to_key(&100, Selector::First);
        assert_eq!(cursor.element().0, 100);
        cursor.remove();
        cursor.move_to_key(&50, Selector::First);
        assert_eq!(cursor.offset(), 25);
        cursor.move_to_key(&51, Selector::First);
        // Absent keys land on the insertion position.
        assert_eq!(cursor.element().0, 52);
        cursor.insert((51, -1));
    });
    tree.assert_correctness();
    assert_eq!(tree.len(), 200);
    assert!(tree.contains_key(&51));
    assert!(!tree.contains_key(&100));
}

#[test]
fn extend_appends_through_ordinary_inserts() {
    let mut tree = tree_of(&[5, 1, 9], 5);
    tree.extend((0..4).map(|k| (k, -k)));
    tree.assert_correctness();
    assert_eq!(keys_of(&tree), vec![0, 1, 1, 2, 3, 5, 9]);
}

#[test]
fn indexes_address_one_version() {
    let mut tree = tree_of(&[10, 20, 30, 40], 5);
    let index = tree.index_of(2);
    assert_eq!(tree.offset_of(index), 2);
    assert_eq!(tree.remove_at(index), (30, 2));
    assert_eq!(keys_of(&tree), vec![10, 20, 40]);
}
