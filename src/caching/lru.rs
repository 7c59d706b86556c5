//! Least recently used key-value store.

use log::debug;
use std::borrow::Borrow;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Key-value store evicting least recently used items once it reaches its
/// capacity. A store without capacity grows without bound.
pub struct Lru<K, V> {
    /// Underlying store.
    map: HashMap<K, Item<V>>,
    /// Maximum capacity of the store, if any.
    capacity: Option<usize>,
    /// Generation of the last item in the store.
    generation: Cell<usize>,
}

/// Item, associating a value with its generation number.
struct Item<V> {
    /// Generation number.
    generation: Cell<usize>,
    /// Value.
    value: V,
}

impl<K, V> Lru<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Creates a store with the given capacity.
    ///
    /// A capacity of zero is treated as one, so that the last inserted item is
    /// always retrievable.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::with_capacity(capacity),
            capacity: Some(capacity),
            generation: Cell::new(0),
        }
    }

    /// Creates a store that never evicts anything.
    pub fn unbounded() -> Self {
        Self {
            map: HashMap::new(),
            capacity: None,
            generation: Cell::new(0),
        }
    }

    /// Returns the capacity of the store, or [`None`] if it is unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Returns the number of items in the store.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Checks whether the store contains the given key.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(k)
    }

    /// Obtains the item for the given key, making it the most recently used.
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.map.get(k) {
            Some(item) => {
                item.generation.set(self.next_generation());
                Some(&item.value)
            }
            None => None,
        }
    }

    /// Inserts the given value in the store, if the store doesn't already
    /// contain this key.
    ///
    /// Returns:
    /// 1. whether an item was inserted,
    /// 2. the evicted key, if any.
    pub fn or_insert_with(&mut self, k: K, default: impl FnOnce() -> V) -> (bool, Option<K>) {
        if self.map.contains_key(&k) {
            return (false, None);
        }

        let evicted = match self.capacity {
            Some(capacity) if self.map.len() >= capacity => self.evict(),
            _ => None,
        };

        self.map.insert(
            k,
            Item {
                generation: Cell::new(self.next_generation()),
                value: default(),
            },
        );
        (true, evicted)
    }

    /// Removes all the items from the store.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Evicts the least recently used item from the store.
    fn evict(&mut self) -> Option<K> {
        if let Some((oldest_key, _)) = self
            .map
            .iter()
            .min_by_key(|(_, item)| item.generation.get())
        {
            debug!("Evicting {:?}", oldest_key);
            let oldest_key = oldest_key.clone();
            self.map.remove(&oldest_key);
            Some(oldest_key)
        } else {
            None
        }
    }

    /// Increments and returns the next generation number.
    fn next_generation(&self) -> usize {
        let new_generation = self.generation.get() + 1;
        self.generation.set(new_generation);
        new_generation
    }
}
