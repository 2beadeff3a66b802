use foldhash::fast::{FixedState, RandomState};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Mutex;

/// The key → value mapping, sharded by key hash.
///
/// The store knows nothing about per-key locking: serializing compound
/// mutations on one key is the façade's job. Each shard mutex is held only
/// for a single O(1) map operation, which keeps the structure race-free and
/// gives readers the happens-before edge that makes [`get`](Self::get) safe
/// without the key's lock.
pub(crate) struct Store<K, V> {
    shards: Vec<Mutex<HashMap<K, V, RandomState>>>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn with_capacity_and_shard_amount(capacity: usize, shard_amount: usize) -> Self {
        let shard_capacity = capacity / shard_amount;
        Self {
            shards: (0..shard_amount)
                .map(|_| {
                    Mutex::new(HashMap::with_capacity_and_hasher(
                        shard_capacity,
                        RandomState::default(),
                    ))
                })
                .collect::<Vec<_>>(),
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.shard(key).lock().unwrap().get(key).cloned()
    }

    pub(crate) fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard(&key).lock().unwrap().insert(key, value)
    }

    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.shard(key).lock().unwrap().remove(key)
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.shard(key).lock().unwrap().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().unwrap().is_empty())
    }

    #[inline(always)]
    fn shard<Q>(&self, key: &Q) -> &Mutex<HashMap<K, V, RandomState>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let idx = FixedState::default().hash_one(key) as usize % self.shards.len();
        &self.shards[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_store_basic_ops() {
        let store = Store::<u32, u32>::with_capacity_and_shard_amount(256, 16);
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.get(&1), None);

        assert_eq!(store.insert(1, 10), None);
        assert_eq!(store.insert(1, 11), Some(10));
        assert_eq!(store.get(&1), Some(11));
        assert!(store.contains_key(&1));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove(&1), Some(11));
        assert_eq!(store.remove(&1), None);
        assert!(!store.contains_key(&1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_borrowed_keys() {
        let store = Store::<String, String>::with_capacity_and_shard_amount(256, 16);
        store.insert("hello".to_string(), "world".to_string());
        assert_eq!(store.get("hello"), Some("world".to_string()));
        assert!(store.contains_key("hello"));
        assert_eq!(store.remove("hello"), Some("world".to_string()));
        assert_eq!(store.get("hello"), None);
    }

    #[test]
    fn test_store_concurrent_distinct_keys() {
        let store = Arc::new(Store::<u32, u32>::with_capacity_and_shard_amount(256, 16));
        let hits = Arc::new(AtomicUsize::new(0));
        const N: usize = 1 << 10;
        const M: usize = 8;

        let threads = (0..M)
            .map(|t| {
                let store = store.clone();
                let hits = hits.clone();
                std::thread::spawn(move || {
                    for i in 0..N {
                        let key = (t * N + i) as u32;
                        store.insert(key, key);
                        if store.get(&key) == Some(key) {
                            hits.fetch_add(1, Ordering::AcqRel);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        threads.into_iter().for_each(|t| t.join().unwrap());

        assert_eq!(hits.load(Ordering::Acquire), N * M);
        assert_eq!(store.len(), N * M);
    }
}
