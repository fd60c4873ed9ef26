//! Property-based tests for `RbTree`.
//!
//! Differential testing against `BTreeMap` as an oracle, with the full
//! red-black invariant check run after every operation.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use common::payload_of;
use proptest::prelude::*;
use rbindex::{LockMode, RbTree, TreeError};
use std::collections::BTreeMap;

// ============================================================================
//  Strategies
// ============================================================================

/// Narrow key range so inserts collide and removes hit.
fn dense_key() -> impl Strategy<Value = i64> {
    -64_i64..64
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i64, u32),
    InsertTry(i64, u32),
    Remove(i64),
    Take(i64),
    Search(i64),
    ValueAt(usize),
    Next(i64),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (dense_key(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            1 => (dense_key(), any::<u32>()).prop_map(|(k, v)| Op::InsertTry(k, v)),
            3 => dense_key().prop_map(Op::Remove),
            1 => dense_key().prop_map(Op::Take),
            2 => dense_key().prop_map(Op::Search),
            1 => (0_usize..160).prop_map(Op::ValueAt),
            1 => dense_key().prop_map(Op::Next),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Differential Testing Against BTreeMap
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every operation agrees with `BTreeMap` and leaves a valid red-black tree.
    #[test]
    fn differential_operations(ops in operations(300)) {
        let tree: RbTree<u32> = RbTree::new();
        let mut oracle: BTreeMap<i64, u32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let previous = tree.insert(k, v, LockMode::None).into_previous();
                    prop_assert_eq!(previous, oracle.insert(k, v));
                }
                Op::InsertTry(k, v) => {
                    // nothing holds a payload lock here, so it never rejects
                    let previous = tree.insert_try(k, v, LockMode::None).unwrap().into_previous();
                    prop_assert_eq!(previous, oracle.insert(k, v));
                }
                Op::Remove(k) => {
                    let expected = oracle.remove(&k).map(|_| ());
                    prop_assert_eq!(tree.remove(k).ok(), expected);
                }
                Op::Take(k) => {
                    let taken = tree.take(k).ok().map(|e| e.into_payload().unwrap());
                    prop_assert_eq!(taken, oracle.remove(&k));
                }
                Op::Search(k) => {
                    prop_assert_eq!(payload_of(&tree, k), oracle.get(&k).copied());
                }
                Op::ValueAt(rank) => {
                    let got = tree.value_at(rank, LockMode::None).map(|a| a.key());
                    match oracle.keys().nth(rank) {
                        Some(&k) => prop_assert_eq!(got, Ok(k)),
                        None => prop_assert_eq!(
                            got,
                            Err(TreeError::OutOfRange { rank, len: oracle.len() })
                        ),
                    }
                }
                Op::Next(k) => {
                    let got = tree.next(k, LockMode::None).ok().map(|a| a.key());
                    let expected = oracle.range(k + 1..).next().map(|(&k, _)| k);
                    prop_assert_eq!(got, expected);
                }
            }

            prop_assert_eq!(tree.len(), oracle.len());
            if let Err(violation) = tree.verify() {
                prop_assert!(false, "invariant broken: {}", violation);
            }
        }

        let keys: Vec<i64> = oracle.keys().copied().collect();
        prop_assert_eq!(tree.keys(), keys);
    }

    /// Black height stays within the red-black bound for any insertion order.
    #[test]
    fn height_is_logarithmic(keys in prop::collection::hash_set(any::<i64>(), 1..500)) {
        let tree: RbTree<()> = RbTree::new();
        for &k in &keys {
            tree.insert(k, (), LockMode::None);
        }

        let black_height = tree.verify().unwrap();
        let bound = usize::BITS - keys.len().leading_zeros();
        prop_assert!(black_height >= 1);
        prop_assert!(black_height <= bound as usize + 1);
    }

    /// Ranks enumerate keys in ascending order.
    #[test]
    fn value_at_matches_sorted_keys(keys in prop::collection::btree_set(-1000_i64..1000, 0..100)) {
        let tree = common::tree_with(keys.iter().copied());

        for (rank, &k) in keys.iter().enumerate() {
            prop_assert_eq!(tree.value_at(rank, LockMode::None).unwrap().key(), k);
        }
        prop_assert!(tree.value_at(keys.len(), LockMode::None).is_err());
    }

    /// Removing every key in any order empties the tree without breaking it.
    #[test]
    fn remove_all_in_any_order(
        keys in prop::collection::vec(dense_key(), 1..128).prop_shuffle()
    ) {
        let tree = common::tree_with(keys.iter().copied());
        let mut expected = tree.len();

        for k in keys {
            if tree.remove(k).is_ok() {
                expected -= 1;
            }
            prop_assert_eq!(tree.len(), expected);
            prop_assert!(tree.verify().is_ok());
        }
        prop_assert!(tree.is_empty());
    }
}

// ============================================================================
//  Fixed Cases
// ============================================================================

#[test]
fn rank_ordering_of_three_keys() {
    let tree = common::tree_with([30, 10, 20]);

    let ranks: Vec<i64> = (0..3)
        .map(|r| tree.value_at(r, LockMode::None).unwrap().key())
        .collect();

    assert_eq!(ranks, vec![10, 20, 30]);
    assert_eq!(
        tree.value_at(3, LockMode::None).unwrap_err(),
        TreeError::OutOfRange { rank: 3, len: 3 }
    );
}

#[test]
fn insert_twice_keeps_size_and_second_payload() {
    let tree: RbTree<&str> = RbTree::new();

    tree.insert(7, "A", LockMode::None);
    let outcome = tree.insert(7, "B", LockMode::None);

    assert!(outcome.is_replaced());
    assert_eq!(outcome.into_previous(), Some("A"));
    assert_eq!(tree.len(), 1);
    assert_eq!(payload_of(&tree, 7), Some("B"));
}

#[test]
fn remove_then_search_reports_not_found() {
    let tree = common::tree_with([1, 5, 9]);

    tree.remove(5).unwrap();

    assert_eq!(tree.len(), 2);
    assert_eq!(
        tree.search(5, LockMode::None).unwrap_err(),
        TreeError::NotFound { key: 5 }
    );
}
