/// Errors reported by [`AvlMap`](crate::AvlMap) operations.
///
/// A failed operation never modifies the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("key {0} is already present")]
    DuplicateKey(i64),
    #[error("key {0} is not present")]
    KeyNotFound(i64),
}
