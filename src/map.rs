extern crate alloc;

use alloc::boxed::Box;
use core::{fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Error, Links, NodeMut, NodeRef, TreeNode};

/// An ordered map from `i64` keys to values, based on an [`AvlTree`].
///
/// Mutating operations report the number of rebalance operations they performed: each promotion,
/// demotion and single rotation counts as one, and a double rotation counts as two.
pub struct AvlMap<V> {
    tree: AvlTree<MapNode<V>>,
}

/// A node of an [`AvlMap`].
///
/// Free-standing nodes serve as connectors for [`AvlMap::join`].
pub struct MapNode<V> {
    links: Links<MapNode<V>>,
    key: i64,
    value: V,
    _unpin: PhantomPinned,
}

impl<V> MapNode<V> {
    /// Returns a new detached node.
    pub fn new(key: i64, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

unsafe impl<V> Linked<Links<MapNode<V>>> for MapNode<V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<V> TreeNode<Links<MapNode<V>>> for MapNode<V> {
    type Key = i64;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<V: fmt::Debug> fmt::Debug for MapNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNode")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

impl<'tree, V> NodeRef<'tree, MapNode<V>> {
    /// Returns the value stored in the node.
    pub fn value(&self) -> &'tree V {
        &self.get().value
    }
}

impl<'tree, V> NodeMut<'tree, MapNode<V>> {
    /// Returns a mutable reference to the value stored in the node.
    pub fn value_mut(&mut self) -> &mut V {
        // SAFETY: Pinning is not structural for `node.value`.
        unsafe { &mut (*self.as_ptr().as_ptr()).value }
    }

    /// Replaces the value stored in the node, returning the previous value.
    pub fn set_value(&mut self, value: V) -> V {
        core::mem::replace(self.value_mut(), value)
    }

    /// Replaces the key of the node, returning the previous key.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the new key compares against every other key of the map the
    /// same way the old key did.
    pub unsafe fn set_key(&mut self, key: i64) -> i64 {
        unsafe { core::mem::replace(&mut (*self.as_ptr().as_ptr()).key, key) }
    }
}

impl<V> AvlMap<V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree, or -1 if the map is empty.
    pub fn height(&self) -> i8 {
        self.tree.height()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key(&self, key: i64) -> bool {
        self.tree.contains_key(&key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get(&self, key: i64) -> Option<&V> {
        self.tree.get(&key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        let node = self.tree.get_raw(&key)?;

        // SAFETY: Pinning is not structural for `node.value`, and the map is mutably borrowed.
        Some(unsafe { &mut (*node.as_ptr()).value })
    }

    /// Inserts `value` at `key`.
    ///
    /// Returns the number of rebalance operations performed. If `key` is already present, the map
    /// is left untouched.
    pub fn insert(&mut self, key: i64, value: V) -> Result<usize, Error> {
        self.tree
            .insert(MapNode::new(key, value))
            .map_err(|rejected| Error::DuplicateKey(rejected.key))
    }

    /// Removes the element with key `key`.
    ///
    /// Returns the number of rebalance operations performed. If `key` is not present, the map is
    /// left untouched.
    pub fn delete(&mut self, key: i64) -> Result<usize, Error> {
        self.tree
            .remove(&key)
            .map(|(_, ops)| ops)
            .ok_or(Error::KeyNotFound(key))
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove(&mut self, key: i64) -> Option<V> {
        self.tree.remove(&key).map(|(node, _)| node.into_value())
    }

    /// Returns the value associated with the minimum key in the map.
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, value)| value)
    }

    /// Returns the value associated with the maximum key in the map.
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, value)| value)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(i64, &V)> {
        self.tree
            .first()
            .map(|node| (node.key, &node.get_ref().value))
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(i64, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(i64, &V)> {
        self.tree
            .last()
            .map(|node| (node.key, &node.get_ref().value))
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(i64, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the key-value pair preceding `key`, which must be present in the map.
    pub fn predecessor(&self, key: i64) -> Option<(i64, &V)> {
        let node = self.tree.cursor_at(&key)?.peek_prev()?;
        Some((node.key, &node.value))
    }

    /// Returns the key-value pair following `key`, which must be present in the map.
    pub fn successor(&self, key: i64) -> Option<(i64, &V)> {
        let node = self.tree.cursor_at(&key)?.peek_next()?;
        Some((node.key, &node.value))
    }

    /// Returns an iterator over the key-value pairs of the map, in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (i64, &V)> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| (node.key, &node.value))
    }

    /// Returns an iterator over the keys of the map, in order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = i64> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| node.key)
    }

    /// Returns an iterator over the values of the map, in key order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| &node.value)
    }

    /// Returns a handle to the root node, or `None` if the map is empty.
    pub fn root(&self) -> Option<NodeRef<'_, MapNode<V>>> {
        self.tree.root()
    }

    /// Returns a mutable handle to the root node, or `None` if the map is empty.
    pub fn root_mut(&mut self) -> Option<NodeMut<'_, MapNode<V>>> {
        self.tree.root_mut()
    }

    /// Splits the map at `key`, returning the elements less than `key` and the elements greater
    /// than `key`. The element at `key` is dropped.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not present in the map.
    pub fn split(self, key: i64) -> (Self, Self) {
        let (left, _, right) = self.tree.split(&key);
        (AvlMap { tree: left }, AvlMap { tree: right })
    }

    /// Joins `connector` and the elements of `other` into this map.
    ///
    /// The connector's key must lie strictly between the keys of `self` and the keys of `other`,
    /// in either order. Returns `|height(self) - height(other)| + 1`.
    ///
    /// # Panics
    ///
    /// Panics if the connector's key does not separate the two maps.
    pub fn join(&mut self, connector: Box<MapNode<V>>, other: AvlMap<V>) -> usize {
        self.tree.join(connector, other.tree)
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Writes a Graphviz rendering of the underlying tree to `w`.
    pub fn dotgraph<W: fmt::Write>(&self, name: &str, w: W) -> fmt::Result {
        self.tree.dotgraph(name, w)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<V> Default for AvlMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for AvlMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> FromIterator<(i64, V)> for AvlMap<V> {
    /// Builds a map from key-value pairs. Later duplicates of a key are dropped.
    fn from_iter<I: IntoIterator<Item = (i64, V)>>(iter: I) -> Self {
        let mut map = AvlMap::new();
        for (key, value) in iter {
            let _ = map.insert(key, value);
        }
        map
    }
}
