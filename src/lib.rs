//! A concurrent key-value map built on per-key lock striping.
//!
//! # Overview
//! `stripemap` serializes mutations per key instead of per map: every key gets
//! its own lazily created lock handle, handed out by a sharded lock table and
//! reclaimed once the key is gone. Mutations on disjoint keys never wait on
//! each other, and the only map-wide critical sections are O(1) bookkeeping
//! steps on a hash-selected shard.
//!
//! # Features
//! - `insert` / `get` / `remove` with per-key serialization
//! - A [`lock`](StripeMap::lock) guard for compound read-modify-write on one key
//! - Reentrant per-key locks: a holder may reenter the same key without deadlock
//! - Lock handles are reclaimed when their key disappears, so the lock table
//!   does not grow with dead keys
//! - No poisoning: a panicking holder releases its key on unwind
//!
//! # Examples
//! ```
//! use stripemap::StripeMap;
//!
//! let map = StripeMap::<String, u32>::new();
//!
//! map.insert("key1".to_string(), 42);
//! assert_eq!(map.get("key1"), Some(42));
//!
//! // Exclusive access for a compound update.
//! {
//!     let mut guard = map.lock("key2".to_string());
//!     let next = guard.get().unwrap_or(0) + 1;
//!     guard.replace(next);
//! }
//! assert_eq!(map.get("key2"), Some(1));
//!
//! assert_eq!(map.remove(&"key1".to_string()), Some(42));
//! assert_eq!(map.get("key1"), None);
//! ```
mod key_lock;
mod lock_table;
mod map;
mod raw_lock;
mod store;

pub use map::{KeyGuard, StripeMap};
