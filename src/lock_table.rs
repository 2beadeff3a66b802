use crate::key_lock::KeyLock;
use foldhash::fast::{FixedState, RandomState};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Mutex};

/// What to do with a handle's table entry when a user returns it.
pub(crate) enum Reclaim {
    /// Leave the entry in place for reuse.
    Keep,
    /// Remove the entry if this was the last user and the entry still refers
    /// to this handle.
    IfUnused,
}

/// The key → lock-handle mapping, sharded by key hash.
///
/// Each shard is a `HashMap` behind its own mutex. Shard critical sections do
/// table bookkeeping only (lookup, insert-if-absent, pin/unpin, conditional
/// remove) and are O(1); the per-key lock itself is never taken while a shard
/// is held, so contention on one key never stalls table access for others.
pub(crate) struct LockTable<K> {
    shards: Vec<Mutex<HashMap<K, Arc<KeyLock>, RandomState>>>,
}

impl<K: Eq + Hash> LockTable<K> {
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

    /// Returns the handle for `key`, creating and inserting one if absent,
    /// and registers the caller as a user of it.
    ///
    /// Lookup and insert happen under one shard critical section, so two
    /// threads racing on the same fresh key always end up sharing a single
    /// handle.
    pub(crate) fn acquire(&self, key: &K) -> Arc<KeyLock>
    where
        K: Clone,
    {
        let mut shard = self.shard(key).lock().unwrap();
        match shard.get(key) {
            Some(handle) => {
                handle.pin();
                handle.clone()
            }
            None => {
                let handle = Arc::new(KeyLock::new());
                handle.pin();
                shard.insert(key.clone(), handle.clone());
                handle
            }
        }
    }

    /// Returns a handle obtained from [`acquire`](Self::acquire).
    ///
    /// With [`Reclaim::IfUnused`], the entry is removed only when the user
    /// count drops to zero *and* the entry still is this very handle, both
    /// checked under the shard critical section that also performs the
    /// removal. A non-zero count means some thread holds or is waiting on the
    /// handle; the entry is then left behind for reuse.
    pub(crate) fn release(&self, key: &K, handle: &Arc<KeyLock>, reclaim: Reclaim) {
        let mut shard = self.shard(key).lock().unwrap();
        let remaining = handle.unpin();
        if remaining == 0 && matches!(reclaim, Reclaim::IfUnused) {
            if let Some(current) = shard.get(key) {
                if Arc::ptr_eq(current, handle) {
                    shard.remove(key);
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().unwrap().is_empty())
    }

    #[inline(always)]
    fn shard(&self, key: &K) -> &Mutex<HashMap<K, Arc<KeyLock>, RandomState>> {
        let idx = FixedState::default().hash_one(key) as usize % self.shards.len();
        &self.shards[idx]
    }
}
