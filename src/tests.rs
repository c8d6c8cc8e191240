extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn map_of(keys: &[i64]) -> AvlMap<i64> {
    let mut map = AvlMap::new();
    for &key in keys {
        map.insert(key, key * 10).expect("keys are distinct");
        map.assert_invariants();
    }
    map
}

fn insert_counts(keys: &[i64]) -> Vec<usize> {
    let mut map = AvlMap::new();
    keys.iter()
        .map(|&key| {
            let ops = map.insert(key, ()).expect("keys are distinct");
            map.assert_invariants();
            ops
        })
        .collect()
}

#[test]
fn insert_single_rotation() {
    assert_eq!(insert_counts(&[10, 20, 30]), [0, 1, 3]);

    let map = map_of(&[10, 20, 30]);
    let root = map.root().unwrap();
    assert_eq!(root.key(), &20);
    assert_eq!(root.height(), 1);
    assert_eq!(root.size(), 3);
    assert_eq!(root.left().unwrap().key(), &10);
    assert_eq!(root.right().unwrap().key(), &30);
}

#[test]
fn insert_double_rotation() {
    assert_eq!(insert_counts(&[30, 10, 20]), [0, 1, 6]);

    let map = map_of(&[30, 10, 20]);
    let root = map.root().unwrap();
    assert_eq!(root.key(), &20);
    assert_eq!(root.left().unwrap().key(), &10);
    assert_eq!(root.right().unwrap().key(), &30);
    assert!(root.left().unwrap().is_leaf());
    assert!(root.right().unwrap().is_leaf());
}

#[test]
fn insert_duplicate_is_rejected() {
    let mut map = map_of(&[1, 2, 3]);

    assert_eq!(map.insert(2, 0), Err(Error::DuplicateKey(2)));
    assert_eq!(map.get(2), Some(&20));
    assert_eq!(map.len(), 3);
    map.assert_invariants();
}

#[test]
fn delete_internal_node_uses_successor() {
    let mut map = map_of(&[4, 2, 6, 1, 3, 5, 7]);

    assert_eq!(map.delete(4), Ok(0));
    map.assert_invariants();

    assert_eq!(map.root().unwrap().key(), &5);
    assert!(map.keys().eq([1, 2, 3, 5, 6, 7]));
    assert_eq!(map.get(5), Some(&50));
}

#[test]
fn delete_demotes_parent() {
    let mut map = map_of(&[2, 1, 3]);

    assert_eq!(map.delete(1), Ok(0));
    map.assert_invariants();
    assert_eq!(map.delete(3), Ok(1));
    map.assert_invariants();

    assert_eq!(map.height(), 0);
    assert!(map.keys().eq([2]));
}

#[test]
fn delete_single_rotation() {
    let mut map = map_of(&[2, 1, 3, 4]);

    assert_eq!(map.delete(1), Ok(3));
    map.assert_invariants();

    assert_eq!(map.root().unwrap().key(), &3);
    assert_eq!(map.height(), 1);
}

#[test]
fn delete_double_rotation() {
    let mut map = map_of(&[2, 1, 4, 3]);

    assert_eq!(map.delete(1), Ok(6));
    map.assert_invariants();

    let root = map.root().unwrap();
    assert_eq!(root.key(), &3);
    assert_eq!(root.edge_signature(), (1, 1));
}

#[test]
fn delete_with_balanced_sibling() {
    let mut map = map_of(&[2, 1, 4, 3, 5]);

    assert_eq!(map.delete(1), Ok(3));
    map.assert_invariants();

    let root = map.root().unwrap();
    assert_eq!(root.key(), &4);
    assert_eq!(root.height(), 2);
    assert_eq!(root.left().unwrap().key(), &2);
}

#[test]
fn delete_missing_key() {
    let mut map = map_of(&[1, 2, 3]);

    assert_eq!(map.delete(9), Err(Error::KeyNotFound(9)));
    assert_eq!(map.len(), 3);

    let mut empty: AvlMap<i64> = AvlMap::new();
    assert_eq!(empty.delete(0), Err(Error::KeyNotFound(0)));
}

#[test]
fn delete_every_key() {
    let keys: Vec<i64> = (0..64).map(|i| (i * 37) % 64).collect();
    let mut map = map_of(&keys);

    for (i, &key) in keys.iter().enumerate() {
        map.delete(key).unwrap();
        map.assert_invariants();
        assert_eq!(map.len(), keys.len() - i - 1);
    }

    assert!(map.is_empty());
    assert_eq!(map.height(), -1);
    assert!(map.root().is_none());
    assert_eq!(map.min(), None);
}

#[test]
fn split_middle() {
    let map = map_of(&[1, 2, 3, 4, 5]);

    let (left, right) = map.split(3);
    left.assert_invariants();
    right.assert_invariants();

    assert!(left.keys().eq([1, 2]));
    assert!(right.keys().eq([4, 5]));
    assert_eq!(left.min(), Some(&10));
    assert_eq!(left.max(), Some(&20));
    assert_eq!(right.min(), Some(&40));
    assert_eq!(right.max(), Some(&50));
}

#[test]
fn split_at_extremes() {
    let (left, right) = map_of(&[1, 2, 3, 4, 5]).split(1);
    assert!(left.is_empty());
    assert_eq!(left.height(), -1);
    assert!(right.keys().eq([2, 3, 4, 5]));
    right.assert_invariants();

    let (left, right) = map_of(&[1, 2, 3, 4, 5]).split(5);
    assert!(left.keys().eq([1, 2, 3, 4]));
    assert!(right.is_empty());
    left.assert_invariants();

    let (left, right) = map_of(&[7]).split(7);
    assert!(left.is_empty());
    assert!(right.is_empty());
}

#[test]
#[should_panic]
fn split_missing_key_panics() {
    let _ = map_of(&[1, 2, 3]).split(4);
}

#[test]
fn split_then_rejoin() {
    let map = map_of(&[1, 2, 3, 4, 5]);
    let (mut left, right) = map.split(3);

    assert_eq!(left.join(MapNode::new(3, 30), right), 1);
    left.assert_invariants();

    assert!(left.keys().eq(1..=5));
    assert_eq!(left.get(3), Some(&30));
}

#[test]
fn join_empty_trees() {
    let mut map: AvlMap<i64> = AvlMap::new();

    assert_eq!(map.join(MapNode::new(8, 80), AvlMap::new()), 1);
    map.assert_invariants();

    assert_eq!(map.len(), 1);
    assert_eq!(map.height(), 0);
    assert_eq!(map.min(), Some(&80));
    assert_eq!(map.max(), Some(&80));
}

#[test]
fn join_singletons() {
    let mut low = map_of(&[1]);
    let high = map_of(&[3]);

    assert_eq!(low.join(MapNode::new(2, 20), high), 1);
    low.assert_invariants();

    assert_eq!(low.len(), 3);
    assert_eq!(low.height(), 1);
    assert_eq!(low.root().unwrap().key(), &2);
}

#[test]
fn join_uneven_heights() {
    let low_keys: Vec<i64> = (1..=15).collect();
    let mut low = map_of(&low_keys);
    let high = map_of(&[17]);
    assert_eq!(low.height(), 3);

    assert_eq!(low.join(MapNode::new(16, 160), high), 4);
    low.assert_invariants();

    assert!(low.keys().eq(1..=17));
    assert_eq!(low.max(), Some(&170));
}

#[test]
fn join_from_high_side() {
    let low_keys: Vec<i64> = (1..=9).collect();
    let low = map_of(&low_keys);
    let mut high = map_of(&[20, 21]);

    let cost = high.join(MapNode::new(10, 100), low);
    high.assert_invariants();

    assert_eq!(cost, 3);
    assert!(high.keys().eq((1..=10).chain(20..=21)));
    assert_eq!(high.min(), Some(&10));
}

#[test]
#[should_panic]
fn join_misordered_panics() {
    let mut low = map_of(&[1, 2]);
    let high = map_of(&[5, 6]);
    low.join(MapNode::new(5, 0), high);
}

#[test]
fn engine_split_hands_back_node() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [5, 3, 8, 1, 4, 7, 9] {
        tree.insert(TestNode::new(key)).unwrap();
    }

    let (low, node, high) = tree.split(&5u32);
    low.assert_invariants();
    high.assert_invariants();

    assert_eq!(node.key, 5);
    assert!(low.iter().map(|n| n.key).eq([1, 3, 4]));
    assert!(high.iter().map(|n| n.key).eq([7, 8, 9]));
}

#[test]
fn engine_remove_reports_ops() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [2, 1, 4, 3] {
        tree.insert(TestNode::new(key)).unwrap();
    }

    let (node, ops) = tree.remove(&1u32).unwrap();
    assert_eq!(node.key, 1);
    assert_eq!(ops, 6);
    tree.assert_invariants();
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

fn distinct_keys() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::btree_set(-500i64..500, 1..200)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn split_equivalence(keys in proptest::collection::vec(any::<u32>(), FUZZ_RANGE), at in any::<usize>()) {
        model::run_split_equivalence(keys, at);
    }

    #[test]
    fn split_partitions_keys(keys in distinct_keys(), pick in any::<prop::sample::Index>()) {
        let at = keys[pick.index(keys.len())];
        let map = map_of(&keys);

        let (left, right) = map.split(at);
        left.assert_invariants();
        right.assert_invariants();

        prop_assert_eq!(left.len() + right.len() + 1, keys.len());
        prop_assert!(left.keys().all(|k| k < at));
        prop_assert!(right.keys().all(|k| k > at));
    }

    #[test]
    fn join_cost_matches_heights(keys in distinct_keys(), pick in any::<prop::sample::Index>()) {
        let at = keys[pick.index(keys.len())];
        let (mut left, right) = map_of(&keys).split(at);

        let expected = usize::from((left.height() - right.height()).unsigned_abs()) + 1;
        prop_assert_eq!(left.join(MapNode::new(at, at * 10), right), expected);
        left.assert_invariants();

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        prop_assert!(left.keys().eq(sorted.iter().copied()));
    }

    #[test]
    fn insert_keeps_height_logarithmic(keys in distinct_keys()) {
        let map = map_of(&keys);

        // An AVL tree of n nodes has height below 1.4405 * log2(n + 2).
        let bound = 1.4405 * ((keys.len() + 2) as f64).log2();
        prop_assert!((map.height() as f64) < bound);
    }
}
