use core::iter::FusedIterator;

use crate::{AvlTree, Link, Links, TreeNode};

/// An in-order iterator over the elements of an [`AvlTree`].
///
/// Each step visits the in-order neighbour of the previous element, so a full traversal completes
/// in _O(n)_ time.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            tree,

            front: tree.first,
            back: tree.last,
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // Once the two ends meet, `len` runs out before either end passes the other.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.front = unsafe { self.tree.successor_raw(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.back = unsafe { self.tree.predecessor_raw(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}
