use core::{fmt, marker::PhantomData, pin::Pin, ptr::NonNull};

use crate::{AvlTree, Links, TreeNode};

/// A shared handle to a node of an [`AvlTree`].
///
/// Missing children are represented by `None`; a missing child has height -1 and size 0.
pub struct NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    ptr: NonNull<T>,
    phantom: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) unsafe fn new(ptr: NonNull<T>) -> Self {
        NodeRef {
            ptr,
            phantom: PhantomData,
        }
    }

    /// Returns a reference to the item stored in the node.
    pub fn get(&self) -> &'tree T {
        // SAFETY: the tree is borrowed for `'tree`.
        unsafe { self.ptr.as_ref() }
    }

    /// Returns the node's key.
    pub fn key(&self) -> &'tree T::Key {
        self.get().key()
    }

    /// Returns the rank of the node: 0 for a leaf, one more than the taller child otherwise.
    pub fn height(&self) -> i8 {
        unsafe { AvlTree::<T>::rank(Some(self.ptr)) }
    }

    /// Returns the number of nodes in the subtree rooted at this node, including itself.
    pub fn size(&self) -> usize {
        unsafe { AvlTree::<T>::size(Some(self.ptr)) }
    }

    /// Returns the rank differences of the node's left and right children.
    pub fn edge_signature(&self) -> (i8, i8) {
        let height = self.height();
        let rank_of = |child: Option<NodeRef<'tree, T>>| child.map_or(-1, |c| c.height());
        (height - rank_of(self.left()), height - rank_of(self.right()))
    }

    /// Returns `true` if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    /// Returns a handle to the left child, or `None` if it is missing.
    pub fn left(&self) -> Option<NodeRef<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().left() }.map(|ptr| unsafe { NodeRef::new(ptr) })
    }

    /// Returns a handle to the right child, or `None` if it is missing.
    pub fn right(&self) -> Option<NodeRef<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().right() }.map(|ptr| unsafe { NodeRef::new(ptr) })
    }

    /// Returns a handle to the parent, or `None` if this is the root.
    pub fn parent(&self) -> Option<NodeRef<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().parent() }.map(|ptr| unsafe { NodeRef::new(ptr) })
    }
}

impl<T> Clone for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> where T: TreeNode<Links<T>> + ?Sized {}

impl<T> fmt::Debug for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", self.key())
            .field("height", &self.height())
            .field("size", &self.size())
            .finish()
    }
}

/// An exclusive handle to a node of an [`AvlTree`].
///
/// The handle can move to a child or to the parent, but never hands out two handles at once.
/// Children are never reassigned through a handle; subtrees change hands only through the tree's
/// own insertion, removal, split and join operations.
pub struct NodeMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    ptr: NonNull<T>,
    phantom: PhantomData<&'tree mut AvlTree<T>>,
}

impl<'tree, T> NodeMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) unsafe fn new(ptr: NonNull<T>) -> Self {
        NodeMut {
            ptr,
            phantom: PhantomData,
        }
    }

    pub(crate) fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Returns a shared handle to the same node.
    pub fn as_ref(&self) -> NodeRef<'_, T> {
        unsafe { NodeRef::new(self.ptr) }
    }

    /// Returns a pinned mutable reference to the item stored in the node.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the item are modified, as
    /// doing so may result in undefined behavior.
    pub unsafe fn get_mut(&mut self) -> Pin<&mut T> {
        unsafe { Pin::new_unchecked(self.ptr.as_mut()) }
    }

    /// Overwrites the node's rank.
    ///
    /// # Safety
    ///
    /// The caller must restore the rank before the tree is used again: every later rebalance
    /// relies on the stored ranks being the subtree heights.
    pub unsafe fn set_height(&mut self, height: i8) {
        unsafe { T::links(self.ptr).as_mut().set_rank(height) }
    }

    /// Overwrites the node's subtree size.
    ///
    /// # Safety
    ///
    /// The caller must restore the size before the tree is used again: removals subtract from the
    /// stored sizes along the path to the root.
    pub unsafe fn set_size(&mut self, size: usize) {
        unsafe { T::links(self.ptr).as_mut().set_size(size) }
    }

    /// Moves the handle to the left child, or returns `None` if it is missing.
    pub fn into_left(self) -> Option<NodeMut<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().left() }.map(|ptr| unsafe { NodeMut::new(ptr) })
    }

    /// Moves the handle to the right child, or returns `None` if it is missing.
    pub fn into_right(self) -> Option<NodeMut<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().right() }.map(|ptr| unsafe { NodeMut::new(ptr) })
    }

    /// Moves the handle to the parent, or returns `None` if this is the root.
    pub fn into_parent(self) -> Option<NodeMut<'tree, T>> {
        unsafe { T::links(self.ptr).as_ref().parent() }.map(|ptr| unsafe { NodeMut::new(ptr) })
    }
}
