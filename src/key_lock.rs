use crate::raw_lock::RawLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity of the current thread, as the address of a thread-local.
///
/// Never zero (it is the address of a live thread-local), so zero can mean
/// "no owner" in [`KeyLock`].
fn current_thread() -> usize {
    thread_local!(static MARKER: u8 = const { 0 });
    MARKER.with(|m| m as *const u8 as usize)
}

/// The per-key mutual-exclusion handle stored in the lock table.
///
/// Reentrant: the owning thread may call [`lock`](Self::lock) again without
/// deadlocking itself, and the lock is released when `unlock` has been called
/// once per `lock`.
///
/// Besides the lock itself, a `KeyLock` carries a `users` count: the number of
/// threads that have been handed this handle by the lock table and have not
/// yet returned it. The count is only ever modified and inspected while the
/// owning table shard is locked, which is what makes "remove the handle only
/// when nobody holds or waits on it" an atomic decision. Every user pins the
/// handle *before* first touching the lock and unlocks *before* unpinning, so
/// a count of zero really does mean no holder and no waiter.
pub(crate) struct KeyLock {
    raw: RawLock,
    /// Thread id of the current owner, zero when unowned. Written only by the
    /// thread that holds `raw`.
    owner: AtomicUsize,
    /// Reentrancy depth. Touched only by the owner.
    recursion: AtomicUsize,
    /// Handle users (holders + waiters + about-to-lock). Guarded by the lock
    /// table shard that owns this handle's entry.
    users: AtomicUsize,
}

impl KeyLock {
    pub(crate) fn new() -> Self {
        Self {
            raw: RawLock::new(),
            owner: AtomicUsize::new(0),
            recursion: AtomicUsize::new(0),
            users: AtomicUsize::new(0),
        }
    }

    /// Blocks until this thread owns the lock. Reentrant.
    pub(crate) fn lock(&self) {
        let tid = current_thread();
        if self.owner.load(Ordering::Relaxed) == tid {
            self.recursion.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.raw.lock();
        self.owner.store(tid, Ordering::Relaxed);
        self.recursion.store(1, Ordering::Relaxed);
    }

    /// Releases one level of ownership; the lock opens to other threads when
    /// the depth reaches zero.
    pub(crate) fn unlock(&self) {
        debug_assert_eq!(
            self.owner.load(Ordering::Relaxed),
            current_thread(),
            "unlock of a key lock this thread does not own"
        );
        if self.recursion.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Relaxed);
            self.raw.unlock();
        }
    }

    /// Registers one more user. Call only with the owning table shard locked.
    pub(crate) fn pin(&self) {
        self.users.fetch_add(1, Ordering::Relaxed);
    }

    /// Deregisters one user, returning the count that remains. Call only with
    /// the owning table shard locked.
    pub(crate) fn unpin(&self) -> usize {
        let previous = self.users.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "unpin of a key lock with no users");
        previous - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_key_lock_reentrant() {
        let lock = KeyLock::new();
        lock.lock();
        lock.lock();
        lock.lock();
        lock.unlock();
        lock.unlock();
        lock.unlock();

        // Fully released: lockable again from scratch.
        lock.lock();
        lock.unlock();
    }

    #[test]
    fn test_key_lock_pin_count() {
        let lock = KeyLock::new();
        lock.pin();
        lock.pin();
        assert_eq!(lock.unpin(), 1);
        lock.pin();
        assert_eq!(lock.unpin(), 1);
        assert_eq!(lock.unpin(), 0);
    }

    #[test]
    fn test_key_lock_mutual_exclusion() {
        let lock = Arc::new(KeyLock::new());
        let current = Arc::new(AtomicU32::new(0));
        const N: usize = 8;
        const M: usize = 1 << 14;

        let threads = (0..N)
            .map(|_| {
                let lock = lock.clone();
                let current = current.clone();
                std::thread::spawn(move || {
                    for _ in 0..M {
                        lock.lock();
                        assert_eq!(current.fetch_add(1, Ordering::AcqRel), 0);
                        // Re-acquire while holding: must not deadlock.
                        lock.lock();
                        lock.unlock();
                        assert_eq!(current.fetch_sub(1, Ordering::AcqRel), 1);
                        lock.unlock();
                    }
                })
            })
            .collect::<Vec<_>>();
        threads.into_iter().for_each(|t| t.join().unwrap());
    }
}
