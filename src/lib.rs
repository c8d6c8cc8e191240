//! An intrusive AVL tree with rank-based rebalancing, split and join.
//#![no_std]

// Conventions used in comments:
// - The rank (height) of a node `x` is denoted `r(x)`. A missing child has rank -1.
// - The parent of a node `x` is denoted `p(x)`.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if its left child is an `i`-child and its right child is a `j`-child. The pair
//   `(i, j)` is the node's edge signature.
//
// The fundamental invariants of an AVL tree, stated with ranks:
// 1. Every node is 1,1, 1,2 or 2,1.
// 2. All leaves have rank 0.
//
// An insertion can leave exactly one node that is 0,1 or 1,0 (fixed by a promotion, which may move
// the violation to the parent) or 0,2 or 2,0 (fixed by a single or double rotation, after which the
// rank rule holds everywhere).
//
// A removal can leave exactly one node that is 2,2 (fixed by a demotion, which may move the
// violation to the parent) or 1,3 or 3,1. Unlike insertion, the rotations fixing a 1,3 or 3,1 node
// may shorten the subtree and move the violation to the parent.

use core::{
    cell::UnsafeCell,
    cmp::Ordering,
    fmt,
    marker::PhantomPinned,
    mem,
    ops::Not,
    pin::Pin,
    ptr::{self, NonNull},
};
use std::borrow::Borrow;

use cordyceps::Linked;
use tracing::{debug, trace};

mod cursor;
mod debug;
mod error;
mod iter;
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
mod node;

#[cfg(test)]
mod tests;

pub use cursor::Cursor;
pub use error::Error;
pub use iter::Iter;
pub use map::{AvlMap, MapNode};
pub use node::{NodeMut, NodeRef};

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Every node carries its rank (height) and the size of its subtree. Besides the usual
/// _O(log(n))_ search, insertion and removal, trees can be split at a key and joined through a
/// connector node in time proportional to the rank difference of the trees involved.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    first: Link<T>,
    last: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    rank: i8,
    size: usize,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            root: None,
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the rank of the root, or -1 if the tree is empty.
    pub fn height(&self) -> i8 {
        unsafe { Self::rank(self.root) }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0);
            assert!(self.first.is_none(), "empty tree has a cached minimum");
            assert!(self.last.is_none(), "empty tree has a cached maximum");
            return;
        };

        unsafe {
            assert!(
                Self::links(root).parent().is_none(),
                "root parent pointer is set"
            );

            self.assert_invariants_at(root);

            assert_eq!(Self::links(root).size(), self.len);
            assert_eq!(self.first, Some(self.min_in_subtree(root).0));
            assert_eq!(self.last, Some(self.max_in_subtree(root).0));
        }

        // Ensure in-order traversal yields strictly increasing keys.
        let mut prev: Option<&T::Key> = None;
        for item in self.iter() {
            if let Some(prev) = prev {
                assert!(prev < item.key(), "{prev:?} precedes {:?}", item.key());
            }
            prev = Some(item.key());
        }
    }

    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) {
        unsafe {
            let links = Self::links(node);
            let left = links.left();
            let right = links.right();
            let left_rank = Self::rank(left);
            let right_rank = Self::rank(right);

            // Ensure the rank is the height of the subtree and all rank differences are 1 or 2.
            assert_eq!(links.rank(), 1 + left_rank.max(right_rank));
            assert!(
                (left_rank - right_rank).abs() <= 1,
                "{:?} is {:?}",
                node.as_ref().key(),
                self.edge_signature(node)
            );

            assert_eq!(links.size(), 1 + Self::size(left) + Self::size(right));

            for child in [left, right].into_iter().flatten() {
                // Ensure child's parent link points to this node.
                let parent = Self::links(child)
                    .parent()
                    .expect("child parent pointer not set");
                assert_eq!(node, parent);

                self.assert_invariants_at(child);
            }
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the tree contains an element with key `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.locate(key)
            .filter(|node| unsafe { key.cmp(node.as_ref().key().borrow()) == Ordering::Equal })
    }

    // Descends from the root toward `key`.
    //
    // Returns the node holding `key` if there is one; otherwise, returns the last node visited,
    // which is the node a new element with key `key` would be attached to. Returns `None` only if
    // the tree is empty.
    fn locate<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root?;

        loop {
            let next = unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Self::links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => Self::links(cur).right(),
                }
            };

            match next {
                Some(next) => cur = next,
                None => return Some(cur),
            }
        }
    }

    /// Returns the minimum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    /// Returns an iterator over the elements of the tree, in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns a cursor pointing to the minimum element of the tree.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.first)
    }

    /// Returns a cursor pointing to the maximum element of the tree.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.last)
    }

    /// Returns a cursor pointing to the element with key `key`, if there is one.
    pub fn cursor_at<Q>(&self, key: &Q) -> Option<Cursor<'_, T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(Cursor::new(self, Some(node)))
    }

    /// Returns a handle to the root node, or `None` if the tree is empty.
    pub fn root(&self) -> Option<NodeRef<'_, T>> {
        self.root.map(|root| unsafe { NodeRef::new(root) })
    }

    /// Returns a mutable handle to the root node, or `None` if the tree is empty.
    pub fn root_mut(&mut self) -> Option<NodeMut<'_, T>> {
        self.root.map(|root| unsafe { NodeMut::new(root) })
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { Self::links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert_eq!(Self::links(parent).child(dir), Some(old_child));
            debug_assert!(
                new_child.is_none() || Self::links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            Self::links_mut(parent).set_child(dir, new_child);
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // The ranks of affected nodes are not updated; their sizes are.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if Self::links(down).right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            let across = Self::links(up).child(dir);
            Self::links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            Self::links_mut(up).set_child(dir, Some(down));
            let parent = Self::links_mut(down).set_parent(Some(up));
            Self::links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            Self::update_size(down);
            Self::update_size(up);
        }
    }

    // Performs a double rotation, moving `up` (a grandchild of `down_second`) above both its parent
    // `down_first` and its grandparent `down_second`.
    //
    // Counts as two rebalance operations.
    unsafe fn rotate_twice_at(
        &mut self,
        down_second: NonNull<T>,
        down_first: NonNull<T>,
        up: NonNull<T>,
    ) {
        unsafe {
            self.rotate_at(down_first, up);
            self.rotate_at(down_second, up);
        }
    }

    /// Inserts an item into the tree.
    ///
    /// Returns the number of rebalance operations performed, counting each promotion, demotion and
    /// single rotation as one. If the tree already holds an element with the same key, the tree is
    /// left untouched and `item` is handed back.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<usize, T::Handle> {
        let ptr = T::into_ptr(item);

        unsafe { Self::links_mut(ptr).reset() };

        let Some(parent) = self.locate(unsafe { ptr.as_ref().key() }) else {
            // Tree is empty. Set `item` as the root and return.
            self.root = Some(ptr);
            self.first = Some(ptr);
            self.last = Some(ptr);
            self.len = 1;
            return Ok(0);
        };

        let dir = match unsafe { ptr.as_ref().key().cmp(parent.as_ref().key()) } {
            Ordering::Less => Dir::Left,
            Ordering::Equal => return Err(unsafe { T::from_ptr(ptr) }),
            Ordering::Greater => Dir::Right,
        };

        unsafe {
            Self::links_mut(parent).set_child(dir, Some(ptr));
            Self::links_mut(ptr).set_parent(Some(parent));

            // A new left child of the minimum is the new minimum, and likewise for the maximum.
            match dir {
                Dir::Left if self.first == Some(parent) => self.first = Some(ptr),
                Dir::Right if self.last == Some(parent) => self.last = Some(ptr),
                _ => (),
            }

            self.grow_path(Some(parent), 1);
        }

        self.len += 1;

        Ok(self.rebalance_after_insert(Some(parent)))
    }

    // Performs a bottom-up rebalance of the tree, starting at `start`, after one of the children of
    // `start` gained a rank.
    //
    // Returns the number of rebalance operations performed.
    fn rebalance_after_insert(&mut self, start: Link<T>) -> usize {
        let mut ops = 0;
        let mut opt_node = start;

        while let Some(node) = opt_node {
            let signature = unsafe { self.edge_signature(node) };

            match signature {
                (0, 1) | (1, 0) => unsafe {
                    trace!(key = ?node.as_ref().key(), ?signature, "promote after insert");
                    self.promote(node);
                    ops += 1;
                    opt_node = Self::links(node).parent();
                },

                (0, 2) => return ops + unsafe { self.rotate_after_insert(node, Dir::Left) },
                (2, 0) => return ops + unsafe { self.rotate_after_insert(node, Dir::Right) },

                // The rank rule holds.
                _ => break,
            }
        }

        ops
    }

    // Restores the rank rule at `z`, which is 0,2 with its 0-child on side `tall`.
    //
    // The rank rule holds everywhere afterward. Returns the number of rebalance operations.
    unsafe fn rotate_after_insert(&mut self, z: NonNull<T>, tall: Dir) -> usize {
        unsafe {
            let x = Self::links(z)
                .child(tall)
                .expect("0-child must not be missing");

            let signature = self.edge_signature_toward(x, tall);

            let ops = match signature {
                // Only reachable through a join: `x` is 1,1.
                (1, 1) => {
                    self.promote(z);
                    self.rotate_at(z, x);
                    self.demote(z);
                    self.promote(x);
                    4
                }

                // Single rotation: the outer grandchild is the taller one.
                (1, 2) => {
                    self.rotate_at(z, x);
                    self.demote(z);
                    2
                }

                // Double rotation: the inner grandchild is the taller one.
                (2, 1) => {
                    let y = Self::links(x)
                        .child(!tall)
                        .expect("1-child must not be missing");

                    self.rotate_twice_at(z, x, y);
                    self.demote(x);
                    self.demote(z);
                    self.promote(y);
                    5
                }

                _ => 0,
            };

            trace!(key = ?z.as_ref().key(), ?tall, ?signature, ops, "rotate after insert");

            ops
        }
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Link<T>) {
        unsafe { self.extreme_in_subtree(root, Dir::Left) }
    }

    // Returns the maximum node in the subtree.
    //
    // If the subtree root is not the maximum, also returns the maximum node's parent.
    #[inline]
    unsafe fn max_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Link<T>) {
        unsafe { self.extreme_in_subtree(root, Dir::Right) }
    }

    unsafe fn extreme_in_subtree(&self, root: NonNull<T>, dir: Dir) -> (NonNull<T>, Link<T>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(child) = unsafe { Self::links(cur).child(dir) } {
            parent = Some(cur);
            cur = child;
        }

        (cur, parent)
    }

    // Returns the in-order neighbour of `node` on side `dir`, or `None` if `node` is the extreme
    // element on that side.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            // If there is a subtree on side `dir`, the neighbour is its innermost node.
            if let Some(child) = Self::links(node).child(dir) {
                return Some(self.extreme_in_subtree(child, !dir).0);
            }

            // Otherwise, ascend until arriving from the `!dir` side.
            let mut cur = node;
            while let Some(parent) = Self::links(cur).parent() {
                if Self::links(parent).child(!dir) == Some(cur) {
                    return Some(parent);
                }

                cur = parent;
            }

            None
        }
    }

    /// Returns the in-order successor of `node`.
    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    /// Returns the in-order predecessor of `node`.
    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    /// Removes the element with key `key` from the tree.
    ///
    /// Returns the removed item along with the number of rebalance operations performed, or `None`
    /// if no element has key `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(T::Handle, usize)>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first?;
        Some(unsafe { self.remove_at(first) }.0)
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last?;
        Some(unsafe { self.remove_at(last) }.0)
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub(crate) unsafe fn remove_at(&mut self, node: NonNull<T>) -> (T::Handle, usize) {
        // There are three possible cases:
        //
        // 1. `node` has two children.
        //
        //    In this case `node`'s successor[^1] is unlinked from its own slot and assumes `node`'s
        //    place, rank and size. The successor's right child is elevated to replace it. The
        //    resulting shape is the same as if the successor's item had been moved into `node` and
        //    the successor's slot removed.
        //
        //    The successor by definition has no left child, so this can be treated as a removal
        //    matching case 2 or 3, rooted at the successor's old parent.
        //
        // 2. `node` has one child.
        //
        //    The sole child is a leaf and is elevated to replace `node`.
        //
        // 3. `node` is a leaf.
        //
        //    `node` is replaced by a missing child.
        //
        // In every case a single slot loses one rank, so its parent is 2,2, 1,3 or 3,1, or the rank
        // rule holds.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            // Update the cached extremes while the neighbours can still be found.
            if self.first == Some(node) {
                self.first = self.successor_raw(node);
            }
            if self.last == Some(node) {
                self.last = self.predecessor_raw(node);
            }

            let parent = Self::links(node).parent();
            let left = Self::links(node).left();
            let right = Self::links(node).right();

            let rebalance_from = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);
                    let successor_right = Self::links(successor).right();

                    if let Some(successor_parent) = successor_parent {
                        // Elevate the successor's right child to replace it.
                        self.replace_child(successor_parent, successor, successor_right);
                        self.maybe_set_parent(successor_right, Some(successor_parent));
                        Self::links_mut(successor).set_right(Some(right));
                        Self::links_mut(right).set_parent(Some(successor));
                    }

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    // Transfer rank and size of `node` to `successor`.
                    let node_rank = Self::links(node).rank();
                    let node_size = Self::links(node).size();

                    let successor_links = Self::links_mut(successor);
                    successor_links.set_parent(parent);
                    successor_links.set_rank(node_rank);
                    successor_links.set_size(node_size);
                    successor_links.set_left(Some(left));
                    // Right link is updated above iff succ != right.

                    Self::links_mut(left).set_parent(Some(successor));

                    Some(successor_parent.unwrap_or(successor))
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    Self::links_mut(child).set_parent(parent);
                    parent
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);
                    parent
                }
            };

            self.shrink_path(rebalance_from, 1);
            self.len -= 1;

            Self::links_mut(node).reset();

            let ops = self.rebalance_after_remove(rebalance_from);

            (T::from_ptr(node), ops)
        }
    }

    // Performs a bottom-up rebalance of the tree, starting at `start`, after one of the children of
    // `start` lost a rank.
    //
    // Returns the number of rebalance operations performed.
    fn rebalance_after_remove(&mut self, start: Link<T>) -> usize {
        let mut ops = 0;
        let mut opt_node = start;

        while let Some(node) = opt_node {
            let signature = unsafe { self.edge_signature(node) };

            match signature {
                (2, 2) => unsafe {
                    trace!(key = ?node.as_ref().key(), "demote 2,2 node after remove");
                    self.demote(node);
                    ops += 1;
                    opt_node = Self::links(node).parent();
                },

                // The right side is short, so the left child is the taller one.
                (1, 3) => {
                    let (rotate_ops, next) = unsafe { self.rotate_after_remove(node, Dir::Left) };
                    ops += rotate_ops;
                    opt_node = next;
                }

                (3, 1) => {
                    let (rotate_ops, next) = unsafe { self.rotate_after_remove(node, Dir::Right) };
                    ops += rotate_ops;
                    opt_node = next;
                }

                // The rank rule holds.
                _ => break,
            }
        }

        ops
    }

    // Restores the rank rule at `z`, which is 1,3 or 3,1 with its 1-child on side `tall`.
    //
    // Returns the number of rebalance operations and the node at which rebalancing continues, if
    // the subtree lost a rank.
    unsafe fn rotate_after_remove(&mut self, z: NonNull<T>, tall: Dir) -> (usize, Link<T>) {
        // Here we give up on descriptive names entirely and just use the names from the paper.
        unsafe {
            let y = Self::links(z)
                .child(tall)
                .expect("1-child must not be missing");

            let signature = self.edge_signature_toward(y, tall);

            let (ops, next) = match signature {
                // The subtree keeps its rank.
                (1, 1) => {
                    self.rotate_at(z, y);
                    self.demote(z);
                    self.promote(y);
                    (3, None)
                }

                (1, 2) => {
                    self.rotate_at(z, y);
                    self.demote_twice(z);
                    (3, Self::links(y).parent())
                }

                (2, 1) => {
                    let v = Self::links(y)
                        .child(!tall)
                        .expect("1-child must not be missing");

                    self.rotate_twice_at(z, y, v);
                    self.promote(v);
                    self.demote_twice(z);
                    self.demote(y);
                    (6, Self::links(v).parent())
                }

                _ => (0, None),
            };

            trace!(key = ?z.as_ref().key(), ?tall, ?signature, ops, "rotate after remove");

            (ops, next)
        }
    }

    /// Splits the tree at `key`.
    ///
    /// Returns a tree holding every element less than `key`, the item with key `key`, and a tree
    /// holding every element greater than `key`. No nodes are copied; subtrees are moved into the
    /// new trees with a join at each ancestor of the split node.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Panics
    ///
    /// Panics if the tree holds no element with key `key`.
    pub fn split<Q>(mut self, key: &Q) -> (Self, T::Handle, Self)
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self
            .get_raw(key)
            .expect("split key must be present in the tree");

        unsafe {
            let left_last = self.predecessor_raw(node);
            let right_first = self.successor_raw(node);

            let (_, first, last) = self.take_parts();
            let left_first = first.filter(|first| !ptr::addr_eq(first.as_ptr(), node.as_ptr()));
            let right_last = last.filter(|last| !ptr::addr_eq(last.as_ptr(), node.as_ptr()));

            let mut left = Self::links_mut(node).set_left(None);
            let mut right = Self::links_mut(node).set_right(None);
            self.maybe_set_parent(left, None);
            self.maybe_set_parent(right, None);

            // Walk up from the split node. Each ancestor joins the tree on its side of `key`,
            // bringing along its subtree on the far side of the path.
            let mut opt_ancestor = Self::links_mut(node).set_parent(None);
            while let Some(ancestor) = opt_ancestor {
                opt_ancestor = Self::links(ancestor).parent();

                if key.cmp(ancestor.as_ref().key().borrow()) == Ordering::Greater {
                    let outer = Self::links_mut(ancestor).set_left(None);
                    self.maybe_set_parent(outer, None);
                    left = Some(Self::join_subtrees(outer, ancestor, left));
                } else {
                    let outer = Self::links_mut(ancestor).set_right(None);
                    self.maybe_set_parent(outer, None);
                    right = Some(Self::join_subtrees(right, ancestor, outer));
                }
            }

            Self::links_mut(node).reset();

            let left = Self::from_parts(left, left_first, left_last);
            let right = Self::from_parts(right, right_first, right_last);

            debug!(
                left_len = left.len(),
                right_len = right.len(),
                left_height = left.height(),
                right_height = right.height(),
                "split tree"
            );

            (left, T::from_ptr(node), right)
        }
    }

    /// Joins `connector` and the elements of `other` into this tree.
    ///
    /// The connector's key must be greater than every key of one operand and less than every key
    /// of the other; either operand may be empty. Returns the cost of the join,
    /// `|r(self) - r(other)| + 1`, where an empty tree has rank -1.
    ///
    /// This operation completes in time proportional to the rank difference of the two trees.
    ///
    /// # Panics
    ///
    /// Panics if the connector's key does not separate the keys of `self` from the keys of
    /// `other`.
    pub fn join(&mut self, connector: T::Handle, mut other: Self) -> usize {
        let connector = T::into_ptr(connector);

        let cost = usize::from((self.height() - other.height()).unsigned_abs()) + 1;

        let self_is_low = unsafe { self.is_low_side(connector, &other) };

        let mut this = mem::take(self);
        let (low, high) = if self_is_low {
            (&mut this, &mut other)
        } else {
            (&mut other, &mut this)
        };

        let (low_root, low_first, _) = low.take_parts();
        let (high_root, _, high_last) = high.take_parts();

        let root = unsafe { Self::join_subtrees(low_root, connector, high_root) };

        *self = Self::from_parts(
            Some(root),
            low_first.or(Some(connector)),
            high_last.or(Some(connector)),
        );

        debug!(cost, len = self.len(), height = self.height(), "joined trees");

        cost
    }

    // Returns `true` if `self` holds the keys below the connector and `other` the keys above it, or
    // `false` for the opposite arrangement.
    unsafe fn is_low_side(&self, connector: NonNull<T>, other: &Self) -> bool {
        let key = unsafe { connector.as_ref().key() };

        let below = |tree: &Self| {
            tree.last
                .map_or(true, |last| unsafe { last.as_ref().key() < key })
        };
        let above = |tree: &Self| {
            tree.first
                .map_or(true, |first| unsafe { first.as_ref().key() > key })
        };

        if below(self) && above(other) {
            true
        } else if above(self) && below(other) {
            false
        } else {
            panic!("connector key {key:?} does not separate the joined trees");
        }
    }

    // Joins two detached subtrees with `connector` between them, returning the new root.
    //
    // Every key in `low` must be less than the connector's key, which must be less than every key
    // in `high`. The connector's links are overwritten.
    unsafe fn join_subtrees(low: Link<T>, connector: NonNull<T>, high: Link<T>) -> NonNull<T> {
        unsafe {
            Self::links_mut(connector).reset();

            let low_rank = Self::rank(low);
            let high_rank = Self::rank(high);

            // Trees within one rank of each other hang directly off the connector.
            if (low_rank - high_rank).abs() <= 1 {
                Self::attach(connector, low, high);
                return connector;
            }

            // Otherwise, descend the taller tree along the spine facing the shorter tree until
            // reaching a subtree no taller than the shorter tree. The connector takes the place of
            // that subtree.
            let (tall, short, toward) = if low_rank > high_rank {
                (low, high, Dir::Right)
            } else {
                (high, low, Dir::Left)
            };
            let short_rank = Self::rank(short);

            let mut parent = tall.expect("taller subtree must not be empty");
            let mut cur = Self::links(parent).child(toward);

            while Self::rank(cur) > short_rank {
                let Some(next) = cur else {
                    unreachable!("a missing child has the lowest rank");
                };

                parent = next;
                cur = Self::links(parent).child(toward);
            }

            trace!(
                low_rank,
                high_rank,
                splice_rank = Self::rank(cur),
                "splice connector"
            );

            match toward {
                Dir::Right => Self::attach(connector, cur, short),
                Dir::Left => Self::attach(connector, short, cur),
            }

            Self::links_mut(parent).set_child(toward, Some(connector));
            Self::links_mut(connector).set_parent(Some(parent));

            let mut scratch = Self::new();
            scratch.root = tall;
            scratch.grow_path(Some(parent), 1 + Self::size(short));
            scratch.len = Self::size(tall);

            // The parent of the connector may now be in either an insertion-style or a
            // removal-style violation, so both are checked at every level.
            let mut opt_node = Some(connector);
            while let Some(node) = opt_node {
                scratch.rebalance_after_insert(Some(node));
                scratch.rebalance_after_remove(Some(node));
                opt_node = Self::links(node).parent();
            }

            let (root, _, _) = scratch.take_parts();
            root.expect("joined tree must not be empty")
        }
    }

    // Makes `low` and `high` the children of the detached node `parent` and recomputes its rank
    // and size.
    unsafe fn attach(parent: NonNull<T>, low: Link<T>, high: Link<T>) {
        unsafe {
            let links = Self::links_mut(parent);
            links.set_left(low);
            links.set_right(high);
            links.set_rank(1 + Self::rank(low).max(Self::rank(high)));
            links.set_size(1 + Self::size(low) + Self::size(high));

            for child in [low, high].into_iter().flatten() {
                Self::links_mut(child).set_parent(Some(parent));
            }
        }
    }

    // Empties the tree without dropping any element, returning its root and cached extremes.
    fn take_parts(&mut self) -> (Link<T>, Link<T>, Link<T>) {
        self.len = 0;
        (self.root.take(), self.first.take(), self.last.take())
    }

    fn from_parts(root: Link<T>, first: Link<T>, last: Link<T>) -> Self {
        AvlTree {
            root,
            first,
            last,
            len: unsafe { Self::size(root) },
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let (root, _, _) = self.take_parts();

        // Ownership runs top-down, so the nodes are released from the root with an explicit stack
        // that never holds more than one pending sibling per level.
        let mut stack: Vec<NonNull<T>> = root.into_iter().collect();

        while let Some(cur) = stack.pop() {
            unsafe {
                let links = Self::links_mut(cur);
                stack.extend(links.set_left(None));
                stack.extend(links.set_right(None));
                links.set_parent(None);

                drop(T::from_ptr(cur));
            }
        }
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.rank = inner.rank.checked_add(1).expect("rank overflow");
        }
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.rank = inner.rank.checked_sub(1).expect("rank underflow");
        }
    }

    #[inline]
    unsafe fn demote_twice(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.rank = inner.rank.checked_sub(2).expect("rank underflow");
        }
    }

    /// Returns the rank of the pointed-to node.
    pub(crate) unsafe fn rank(node: Link<T>) -> i8 {
        node.map(|n| unsafe { Self::links(n).rank() }).unwrap_or(-1)
    }

    /// Returns the size of the subtree rooted at the pointed-to node.
    pub(crate) unsafe fn size(node: Link<T>) -> usize {
        node.map(|n| unsafe { Self::links(n).size() }).unwrap_or(0)
    }

    unsafe fn update_size(node: NonNull<T>) {
        unsafe {
            let links = Self::links_mut(node);
            let size = 1 + Self::size(links.left()) + Self::size(links.right());
            links.set_size(size);
        }
    }

    unsafe fn grow_path(&mut self, mut opt_node: Link<T>, by: usize) {
        while let Some(node) = opt_node {
            unsafe {
                let links = Self::links_mut(node);
                links.set_size(links.size() + by);
                opt_node = links.parent();
            }
        }
    }

    unsafe fn shrink_path(&mut self, mut opt_node: Link<T>, by: usize) {
        while let Some(node) = opt_node {
            unsafe {
                let links = Self::links_mut(node);
                links.set_size(links.size() - by);
                opt_node = links.parent();
            }
        }
    }

    /// Returns the rank differences of the left and right children of `node`.
    pub(crate) unsafe fn edge_signature(&self, node: NonNull<T>) -> (i8, i8) {
        unsafe {
            let links = Self::links(node);
            let rank = links.rank();
            (
                rank - Self::rank(links.left()),
                rank - Self::rank(links.right()),
            )
        }
    }

    // Returns the rank differences of the children of `node`, outer child (on side `dir`) first.
    unsafe fn edge_signature_toward(&self, node: NonNull<T>, dir: Dir) -> (i8, i8) {
        unsafe {
            let (left, right) = self.edge_signature(node);
            match dir {
                Dir::Left => (left, right),
                Dir::Right => (right, left),
            }
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { Self::links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                rank: 0,
                size: 1,
                _unpin: PhantomPinned,
            }),
        }
    }

    // Returns the links to the state of a detached leaf.
    #[inline]
    fn reset(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.rank = 0;
        inner.size = 1;
    }

    #[inline]
    fn rank(&self) -> i8 {
        unsafe { (*self.inner.get()).rank }
    }

    #[inline]
    fn size(&self) -> usize {
        unsafe { (*self.inner.get()).size }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_rank(&mut self, rank: i8) {
        self.inner.get_mut().rank = rank;
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.inner.get_mut().size = size;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod engine_tests {
    extern crate std;
    use std::prelude::v1::*;

    use super::*;
    use crate::model::TestNode;

    fn insert_find_all(keys: &[u32]) {
        let mut tree: AvlTree<TestNode> = AvlTree::new();

        for &key in keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
            tree.assert_invariants();
        }

        for key in keys {
            let node = tree.get_raw(key).expect("item not found");
            assert_eq!(unsafe { node.as_ref().key() }, key);
        }
    }

    #[test]
    fn zero_elems_find() {
        insert_find_all(&[]);
    }

    #[test]
    fn single_elem_find() {
        insert_find_all(&[0]);
    }

    #[test]
    fn two_elems_find() {
        insert_find_all(&[0, 1]);
        insert_find_all(&[1, 0]);
    }

    #[test]
    fn three_elems_find() {
        insert_find_all(&[0, 1, 2]);
        insert_find_all(&[0, 2, 1]);
        insert_find_all(&[1, 0, 2]);
        insert_find_all(&[1, 2, 0]);
        insert_find_all(&[2, 0, 1]);
        insert_find_all(&[2, 1, 0]);
    }

    fn insert_remove_all(keys: &[u32]) {
        let mut tree: AvlTree<TestNode> = AvlTree::new();

        for &key in keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
            tree.assert_invariants();
        }

        for key in keys {
            let (node, _) = tree.remove(key).expect("item not found");
            assert_eq!(node.key, *key);
            tree.assert_invariants();
        }

        assert!(tree.is_empty());

        for &key in keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
            tree.assert_invariants();
        }

        for key in keys.iter().rev() {
            assert!(tree.remove(key).is_some());
            tree.assert_invariants();
        }
    }

    #[test]
    fn remove_one() {
        insert_remove_all(&[0]);
    }

    #[test]
    fn remove_two() {
        insert_remove_all(&[0, 1]);
        insert_remove_all(&[1, 0]);
    }

    #[test]
    fn remove_three() {
        insert_remove_all(&[0, 1, 2]);
        insert_remove_all(&[0, 2, 1]);
        insert_remove_all(&[1, 0, 2]);
        insert_remove_all(&[1, 2, 0]);
        insert_remove_all(&[2, 0, 1]);
        insert_remove_all(&[2, 1, 0]);
    }

    // Visits every permutation of `0..n` in lexicographic order.
    fn for_each_permutation(n: u32, mut f: impl FnMut(&[u32])) {
        let mut keys: Vec<u32> = (0..n).collect();

        loop {
            f(&keys);

            let Some(i) = keys.windows(2).rposition(|w| w[0] < w[1]) else {
                return;
            };
            let j = keys.iter().rposition(|&k| k > keys[i]).unwrap();
            keys.swap(i, j);
            keys[i + 1..].reverse();
        }
    }

    #[test]
    fn four_elems_find() {
        for_each_permutation(4, insert_find_all);
    }

    #[test]
    fn remove_four() {
        for_each_permutation(4, insert_remove_all);
    }

    #[test]
    fn remove_six() {
        for_each_permutation(6, insert_remove_all);
    }

    #[test]
    fn duplicate_insert_hands_item_back() {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        tree.insert(TestNode::new(7)).unwrap();

        let rejected = tree.insert(TestNode::new(7)).unwrap_err();
        assert_eq!(rejected.key, 7);
        assert_eq!(tree.len(), 1);
        tree.assert_invariants();
    }

    #[test]
    fn neighbors() {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        for key in [40, 20, 60, 10, 30, 50, 70] {
            tree.insert(TestNode::new(key)).unwrap();
        }

        let keys: [u32; 7] = [10, 20, 30, 40, 50, 60, 70];
        for (i, key) in keys.iter().enumerate() {
            let node = tree.get_raw(key).unwrap();
            let succ = unsafe { tree.successor_raw(node).map(|n| n.as_ref().key) };
            let pred = unsafe { tree.predecessor_raw(node).map(|n| n.as_ref().key) };

            assert_eq!(succ, keys.get(i + 1).copied());
            assert_eq!(pred, i.checked_sub(1).map(|j| keys[j]));
        }
    }

    #[test]
    fn locate_returns_attachment_point() {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        assert!(tree.locate(&5u32).is_none());

        for key in [20, 10, 30] {
            tree.insert(TestNode::new(key)).unwrap();
        }

        let at = |key: u32| unsafe { tree.locate(&key).map(|n| n.as_ref().key) };
        assert_eq!(at(20), Some(20));
        assert_eq!(at(5), Some(10));
        assert_eq!(at(25), Some(30));
        assert_eq!(at(35), Some(30));
    }

    #[test]
    fn clear_releases_everything() {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        for key in 0..100 {
            tree.insert(TestNode::new(key)).unwrap();
        }

        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.first().is_none());
        assert!(tree.last().is_none());
        tree.assert_invariants();
    }
}
