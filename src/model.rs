extern crate std;

use std::{collections::BTreeMap, mem, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlMap, Links, MapNode, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Delete(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
    SplitJoin(ItemValue),
}

impl Op {
    // Resolves index-based items against the keys currently in the map.
    fn finalize(self, sorted: &[i64]) -> FinalOp {
        fn get_key(v: &[i64], i: ItemValue) -> i64 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as i64
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => i64::from(v),
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_key(sorted, item)),
            Op::Get(item) => FinalOp::Get(get_key(sorted, item)),
            Op::Delete(item) => FinalOp::Delete(get_key(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
            Op::SplitJoin(item) => FinalOp::SplitJoin(get_key(sorted, item)),
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(i64),
    Get(i64),
    Delete(i64),
    First,
    PopFirst,
    Last,
    PopLast,
    SplitJoin(i64),
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Delete),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
        value_strategy().prop_map(Op::SplitJoin),
    ]
}

fn value_for(key: i64) -> u64 {
    key.unsigned_abs().wrapping_mul(31)
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree: BTreeMap<i64, u64> = BTreeMap::new();
    let mut avl: AvlMap<u64> = AvlMap::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        let sorted: Vec<i64> = btree.keys().copied().collect();
        let final_op = op.finalize(&sorted);

        match final_op {
            FinalOp::Insert(key) => {
                let from_btree = btree.insert(key, value_for(key)).is_none();
                let from_avl = avl.insert(key, value_for(key)).is_ok();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                assert_eq!(btree.get(&key), avl.get(key), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Delete(key) => {
                let from_btree = btree.remove(&key).is_some();
                let from_avl = avl.delete(key).is_ok();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value().map(|(&k, v)| (k, v));
                assert_eq!(from_btree, avl.first_key_value(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                assert_eq!(btree.pop_first(), avl.pop_first(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value().map(|(&k, v)| (k, v));
                assert_eq!(from_btree, avl.last_key_value(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                assert_eq!(btree.pop_last(), avl.pop_last(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::SplitJoin(key) => {
                if let Some(&value) = btree.get(&key) {
                    avl = split_and_rejoin(mem::take(&mut avl), &btree, key, value);
                }
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.keys().copied().eq(avl.keys()));
        assert_eq!(btree.first_key_value().map(|(_, v)| v), avl.min());
        assert_eq!(btree.last_key_value().map(|(_, v)| v), avl.max());
    }
}

// Splits `avl` at `key`, checks both halves against `btree`, and joins them back together.
fn split_and_rejoin(
    avl: AvlMap<u64>,
    btree: &BTreeMap<i64, u64>,
    key: i64,
    value: u64,
) -> AvlMap<u64> {
    let (mut left, right) = avl.split(key);

    left.assert_invariants();
    right.assert_invariants();
    assert!(btree.range(..key).map(|(&k, _)| k).eq(left.keys()));
    assert!(btree.range(key + 1..).map(|(&k, _)| k).eq(right.keys()));

    let expected_cost = usize::from((left.height() - right.height()).unsigned_abs()) + 1;
    let cost = left.join(MapNode::new(key, value), right);
    assert_eq!(cost, expected_cost);

    left
}

#[derive(Clone, Debug)]
pub struct SplitEquivalenceInput {
    pub keys: Vec<u32>,
    pub at: usize,
}

impl<'a> arbitrary::Arbitrary<'a> for SplitEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        fn key(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u32::arbitrary(u).unwrap_or(0)
        }

        let num_keys = u16::arbitrary(u)? % 1000;
        let at = usize::arbitrary(u)?;

        let keys = core::iter::repeat_with(|| key(u))
            .take(num_keys.into())
            .collect();

        Ok(SplitEquivalenceInput { keys, at })
    }
}

/// Builds a map from `keys`, splits it at the key with index `at` (modulo the number of distinct
/// keys), and compares both halves with `BTreeMap::split_off`.
pub fn run_split_equivalence(keys: Vec<u32>, at: usize) {
    let mut btree: BTreeMap<i64, u64> = BTreeMap::new();
    let mut avl: AvlMap<u64> = AvlMap::new();

    for key in keys.into_iter().map(i64::from) {
        btree.insert(key, value_for(key));
        let _ = avl.insert(key, value_for(key));
    }

    if btree.is_empty() {
        return;
    }

    let key = *btree.keys().nth(at % btree.len()).expect("index is in range");

    let mut greater = btree.split_off(&key);
    greater.remove(&key);

    let (left, right) = avl.split(key);
    left.assert_invariants();
    right.assert_invariants();

    assert!(btree.iter().map(|(&k, v)| (k, v)).eq(left.iter()));
    assert!(greater.iter().map(|(&k, v)| (k, v)).eq(right.iter()));
}
