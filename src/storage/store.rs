//! In-Memory Key-Value Store
//!
//! A flat mapping from binary keys to binary values. The store has no
//! interior mutability and no locks: every mutation requires `&mut self`.
//! The server owns exactly one store, reached only from the event-loop
//! thread, so exclusive access is enforced by the borrow checker instead
//! of a synchronization primitive.

use bytes::Bytes;
use std::collections::HashMap;

/// The key-value store backing all commands.
///
/// # Example
///
/// ```
/// use emberkv::storage::Store;
/// use bytes::Bytes;
///
/// let mut store = Store::new();
/// store.set(Bytes::from("name"), Bytes::from("ember"));
/// assert_eq!(store.get(b"name"), Some(Bytes::from("ember")));
/// assert!(store.del(b"name"));
/// assert_eq!(store.get(b"name"), None);
/// ```
#[derive(Default)]
pub struct Store {
    data: HashMap<Bytes, Bytes>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("keys", &self.data.len()).finish()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    ///
    /// The returned `Bytes` is a cheap reference-counted clone of the
    /// stored value.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.get(key).cloned()
    }

    /// Inserts or overwrites a key-value pair.
    ///
    /// Returns `true` if the key was new, `false` if it was overwritten.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> bool {
        self.data.insert(key, value).is_none()
    }

    /// Removes a key if present.
    ///
    /// Returns `true` if the key existed. Deleting an absent key is not
    /// an error.
    pub fn del(&mut self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
