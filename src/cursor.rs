use crate::{AvlTree, Link, Links, NodeRef, TreeNode};

/// A cursor over an [`AvlTree`].
///
/// A cursor points either to an element of the tree or to a "ghost" non-element that connects the
/// last element to the first.
pub struct Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: &'tree AvlTree<T>,
    ptr: Link<T>,
}

impl<'tree, T> Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn new(tree: &'tree AvlTree<T>, ptr: Link<T>) -> Cursor<'tree, T> {
        Cursor { tree, ptr }
    }

    /// Moves the cursor to the next element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the first
    /// element. If it is pointing to the last element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        self.ptr = self.next_ptr();
    }

    /// Moves the cursor to the previous element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the last
    /// element. If it is pointing to the first element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_prev(&mut self) {
        self.ptr = self.prev_ptr();
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&'tree T> {
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns a handle to the node pointed to by the cursor.
    pub fn node(&self) -> Option<NodeRef<'tree, T>> {
        self.ptr.map(|p| unsafe { NodeRef::new(p) })
    }

    /// Returns a reference to the next item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the first element.
    /// If it is pointing to the last element, this method returns `None`.
    pub fn peek_next(&self) -> Option<&'tree T> {
        self.next_ptr().map(|p| unsafe { p.as_ref() })
    }

    /// Returns a reference to the previous item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the last element.
    /// If it is pointing to the first element, this method returns `None`.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        self.prev_ptr().map(|p| unsafe { p.as_ref() })
    }

    fn next_ptr(&self) -> Link<T> {
        match self.ptr {
            Some(p) => unsafe { self.tree.successor_raw(p) },
            None => self.tree.first,
        }
    }

    fn prev_ptr(&self) -> Link<T> {
        match self.ptr {
            Some(p) => unsafe { self.tree.predecessor_raw(p) },
            None => self.tree.last,
        }
    }
}
