//! Sorted entry table
//!
//! BTreeMap keyed under a [`DataType`] comparator. Shared by the plain
//! backends and the write buffer.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec::DataType;

/// Key bytes carrying the comparator that orders them
struct OrderedKey {
    bytes: Vec<u8>,
    order: Arc<dyn DataType>,
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.bytes, &other.bytes)
    }
}

pub(crate) struct SortedEntries<V> {
    order: Arc<dyn DataType>,
    items: BTreeMap<OrderedKey, V>,
}

impl<V> SortedEntries<V> {
    pub fn new(order: Arc<dyn DataType>) -> Self {
        Self {
            order,
            items: BTreeMap::new(),
        }
    }

    /// Build from entries in any order; a later duplicate key wins
    pub fn from_unsorted(order: Arc<dyn DataType>, entries: Vec<(Vec<u8>, V)>) -> Self {
        let mut table = Self::new(order);
        for (key, value) in entries {
            table.insert(key, value);
        }
        table
    }

    fn key(&self, bytes: Vec<u8>) -> OrderedKey {
        OrderedKey {
            bytes,
            order: Arc::clone(&self.order),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.items.get(&self.key(key.to_vec()))
    }

    pub fn insert(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        let key = self.key(key);
        self.items.insert(key, value)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let key = self.key(key.to_vec());
        self.items.remove(&key)
    }

    /// Remove `key` only if `pred` accepts its current value
    pub fn remove_if(&mut self, key: &[u8], pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let key = self.key(key.to_vec());
        if pred(self.items.get(&key)?) {
            self.items.remove(&key)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> {
        self.items.iter().map(|(k, v)| (k.bytes.as_slice(), v))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<V: Clone> SortedEntries<V> {
    pub fn to_vec(&self) -> Vec<(Vec<u8>, V)> {
        self.iter().map(|(k, v)| (k.to_vec(), v.clone())).collect()
    }
}

