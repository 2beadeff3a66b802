//! Futex-based mutex, following the shape of std's `sys::sync::mutex::futex`.

use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

const UNLOCKED: u32 = 0;
/// Locked, nobody parked on the futex.
const LOCKED: u32 = 1;
/// Locked, with at least one thread parked (or about to park).
const CONTENDED: u32 = 2;

/// The non-reentrant blocking core under [`KeyLock`](crate::key_lock::KeyLock).
///
/// A three-state futex mutex: uncontended lock/unlock is a single
/// compare-exchange, contended acquisition spins briefly and then parks on the
/// futex word. Unlike `std::sync::Mutex` there is no poisoning; a panicking
/// holder simply unlocks from its drop glue.
pub(crate) struct RawLock {
    state: AtomicU32,
}

impl RawLock {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    #[inline]
    pub(crate) fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
    }

    #[inline]
    pub(crate) fn lock(&self) {
        if !self.try_lock() {
            self.lock_contended();
        }
    }

    #[cold]
    fn lock_contended(&self) {
        // Spin first in case the holder is about to release.
        let mut state = self.spin();

        // If it became free while spinning, try to take it without marking
        // the lock contended.
        if state == UNLOCKED {
            match self
                .state
                .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(s) => state = s,
            }
        }

        loop {
            // Move to the contended state before parking, skipping the write
            // when another waiter already did it.
            if state != CONTENDED && self.state.swap(CONTENDED, Acquire) == UNLOCKED {
                // Swapped UNLOCKED -> CONTENDED: the lock is ours.
                return;
            }

            atomic_wait::wait(&self.state, CONTENDED);

            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            // Plain loads while spinning keep the cache line shared.
            let state = self.state.load(Relaxed);

            // Stop on UNLOCKED (worth a lock attempt) and on CONTENDED
            // (someone is already parked, join them).
            if state != LOCKED || spin == 0 {
                return state;
            }

            std::hint::spin_loop();
            spin -= 1;
        }
    }

    #[inline]
    pub(crate) fn unlock(&self) {
        if self.state.swap(UNLOCKED, Release) == CONTENDED {
            // Wake a single waiter; when it acquires the lock it re-marks the
            // state CONTENDED, so any remaining waiters get woken in turn.
            self.wake();
        }
    }

    #[cold]
    fn wake(&self) {
        atomic_wait::wake_one(&self.state);
    }
}
