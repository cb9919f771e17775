//! Insertion-ordered keyed collection
//!
//! [`OrderedMap`] keeps a key sequence (whose order is significant) next to a
//! key→value map. It is the storage behind a [`LiveArray`](crate::LiveArray)
//! but has no knowledge of serials or channels.
//!
//! ## Invariant
//!
//! Every key in the order has exactly one entry in the map and vice versa;
//! the order never contains duplicates.
//!
//! ## Example
//!
//! ```rust
//! use verto_live_array::OrderedMap;
//!
//! let mut roster = OrderedMap::new();
//! assert!(!roster.add("alice".to_string(), 1, None));
//! assert!(!roster.add("carol".to_string(), 3, None));
//!
//! // Splicing into the middle reports a structural reorder
//! assert!(roster.add("bob".to_string(), 2, Some(1)));
//! assert_eq!(roster.values(), vec![&1, &2, &3]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// Ordered key→value container
///
/// All operations are O(n) in the number of keys; collections are expected to
/// be small (conference rosters, presence lists).
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    order: Vec<K>,
    entries: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty collection
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Insert or replace `key`.
    ///
    /// A new key is appended when `index` is `None` or out of range, otherwise
    /// it is spliced in front of the key currently at `index`. An existing key
    /// keeps its position and only has its value replaced.
    ///
    /// Returns `true` when the insertion was not a plain append, so callers can
    /// choose between an incremental update and a full redraw.
    pub fn add(&mut self, key: K, value: V, index: Option<usize>) -> bool {
        let mut redraw = false;

        if !self.entries.contains_key(&key) {
            match index {
                Some(at) if at < self.order.len() => {
                    self.order.insert(at, key.clone());
                    redraw = true;
                }
                _ => self.order.push(key.clone()),
            }
        }

        self.entries.insert(key, value);
        redraw
    }

    /// Remove `key`, returning whether it existed
    pub fn remove(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    /// Rebuild the order from `new_order`.
    ///
    /// Values of listed keys are kept; keys missing from `new_order` are
    /// dropped together with their values. Listed keys without a value, and
    /// repeated keys, are skipped.
    pub fn reorder<I>(&mut self, new_order: I)
    where
        I: IntoIterator<Item = K>,
    {
        let mut previous = std::mem::take(&mut self.entries);
        self.order.clear();

        for key in new_order {
            if let Some(value) = previous.remove(&key) {
                self.order.push(key.clone());
                self.entries.insert(key, value);
            }
        }
    }

    /// Drop every key and value
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Position of `key` in the order
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    /// Keys in order
    pub fn keys(&self) -> &[K] {
        &self.order
    }

    /// Values in key order
    pub fn values(&self) -> Vec<&V> {
        self.iter().map(|(_, v)| v).collect()
    }

    /// `(key, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.order
            .iter()
            .filter_map(move |k| self.entries.get(k).map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
