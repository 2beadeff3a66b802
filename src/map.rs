use crate::key_lock::KeyLock;
use crate::lock_table::{LockTable, Reclaim};
use crate::store::Store;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

/// A concurrent key-value map with per-key lock striping.
///
/// Mutations on different keys run fully in parallel; mutations on the same
/// key serialize on a lazily created, reclaimable per-key lock. There is no
/// map-wide lock on the data path — the only map-wide structures are sharded
/// bookkeeping tables whose critical sections are O(1).
pub struct StripeMap<K: Eq + Hash, V> {
    store: Store<K, V>,
    locks: LockTable<K>,
}

impl<K: Eq + Hash, V> Default for StripeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the default number of shards for the bookkeeping tables.
fn default_shard_amount() -> usize {
    static DEFAULT_SHARD_AMOUNT: OnceLock<usize> = OnceLock::new();
    *DEFAULT_SHARD_AMOUNT.get_or_init(|| {
        (std::thread::available_parallelism().map_or(1, usize::from) * 4).next_power_of_two()
    })
}

impl<K: Eq + Hash, V> StripeMap<K, V> {
    /// Creates an empty `StripeMap` with the default number of shards.
    pub fn new() -> Self {
        Self::with_capacity_and_shard_amount(0, default_shard_amount())
    }

    /// Creates an empty `StripeMap` with at least the given capacity and the
    /// default number of shards.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_shard_amount(capacity, default_shard_amount())
    }

    /// Creates an empty `StripeMap` with at least the given capacity, split
    /// over `shard_amount` shards.
    ///
    /// The shard count is a performance knob, not a correctness one: it
    /// bounds how many unrelated keys can contend on the same bookkeeping
    /// mutex, never which keys may mutate in parallel.
    pub fn with_capacity_and_shard_amount(capacity: usize, shard_amount: usize) -> Self {
        Self {
            store: Store::with_capacity_and_shard_amount(capacity, shard_amount),
            locks: LockTable::with_capacity_and_shard_amount(0, shard_amount),
        }
    }

    /// Inserts a value, returning the previous value for the key if any.
    ///
    /// Waits for exclusive access to the key first, so an insert never
    /// interleaves with another thread's in-progress mutation of the same
    /// key.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// assert_eq!(map.insert("key".to_string(), 42), None);
    /// assert_eq!(map.insert("key".to_string(), 123), Some(42));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        K: Clone,
    {
        let mut guard = self.lock(key);
        guard.replace(value)
    }

    /// Gets a clone of the value associated with the key, or `None` if the
    /// key is absent.
    ///
    /// Reads go through the store's shard mutex only and do not take the
    /// per-key lock: the shard mutex already orders the read after every
    /// completed write, and a concurrent locked mutation publishes its value
    /// in one atomic store operation, so the result is always some value the
    /// key actually held.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// map.insert("key".to_string(), 42);
    /// assert_eq!(map.get("key"), Some(42));
    /// assert_eq!(map.get("missing"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.store.get(key)
    }

    /// Removes a key, returning its value if it was present.
    ///
    /// Removal of an absent key is a no-op, but it still acquires the key's
    /// lock so that it serializes correctly against a concurrent insert of
    /// the same key. After the removal the per-key lock is reclaimed from the
    /// lock table, unless another thread holds or is waiting on it.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// map.insert("key".to_string(), 42);
    /// assert_eq!(map.remove(&"key".to_string()), Some(42));
    /// assert_eq!(map.remove(&"key".to_string()), None);
    /// assert_eq!(map.get("key"), None);
    /// ```
    pub fn remove(&self, key: &K) -> Option<V>
    where
        K: Clone,
    {
        let mut guard = self.lock(key.clone());
        guard.take()
    }

    /// Acquires exclusive access to one key for a compound mutation.
    ///
    /// Blocks until no other thread holds the key. The returned guard reads
    /// and writes the key through [`KeyGuard::get`], [`KeyGuard::replace`]
    /// and [`KeyGuard::take`]; dropping it releases the key on every exit
    /// path, including unwinding.
    ///
    /// The per-key lock is reentrant: the holding thread may nest `lock`,
    /// `insert`, `get` or `remove` calls on the same key without
    /// deadlocking itself.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// map.insert("key".to_string(), 1);
    /// {
    ///     let mut guard = map.lock("key".to_string());
    ///     let next = guard.get().unwrap_or(0) + 1;
    ///     guard.replace(next);
    /// }
    /// assert_eq!(map.get("key"), Some(2));
    /// ```
    pub fn lock(&self, key: K) -> KeyGuard<'_, K, V>
    where
        K: Clone,
    {
        let handle = self.locks.acquire(&key);
        handle.lock();
        KeyGuard {
            map: self,
            key,
            handle,
        }
    }

    /// Returns whether the key is currently present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.store.contains_key(key)
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// RAII guard for exclusive access to one key of a [`StripeMap`].
///
/// While the guard lives, no other thread can mutate the key. Dropping the
/// guard unlocks the key, returns the lock handle to the table and, when the
/// key is no longer present in the map, reclaims the handle so the lock table
/// does not grow with dead keys.
pub struct KeyGuard<'a, K: Eq + Hash, V> {
    map: &'a StripeMap<K, V>,
    key: K,
    handle: Arc<KeyLock>,
}

impl<K: Eq + Hash, V> KeyGuard<'_, K, V> {
    /// The key this guard holds.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Gets a clone of the current value, or `None` if the key is vacant.
    pub fn get(&self) -> Option<V>
    where
        V: Clone,
    {
        self.map.store.get(&self.key)
    }

    /// Sets the value, returning the previous one if any.
    pub fn replace(&mut self, value: V) -> Option<V>
    where
        K: Clone,
    {
        self.map.store.insert(self.key.clone(), value)
    }

    /// Removes the value, returning it if the key was present.
    pub fn take(&mut self) -> Option<V> {
        self.map.store.remove(&self.key)
    }
}

impl<K: Eq + Hash, V> Drop for KeyGuard<'_, K, V> {
    fn drop(&mut self) {
        // Decide on reclamation while still holding the key: a vacant key has
        // no foreseeable need for its lock.
        let reclaim = if self.map.store.contains_key(&self.key) {
            Reclaim::Keep
        } else {
            Reclaim::IfUnused
        };
        self.handle.unlock();
        self.map.locks.release(&self.key, &self.handle, reclaim);
    }
}
