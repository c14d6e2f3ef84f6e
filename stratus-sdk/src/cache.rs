//! Pluggable storage for identity records.
//!
//! The account handle never talks to a global cache; whoever constructs the
//! account injects the backing store. Anything that can read and write a
//! record by string key qualifies.

use crate::identity::IdentityRecord;
use std::collections::HashMap;
use std::sync::Mutex;

/// Narrow read/write interface satisfied by the built-in [`MemoryCache`] or
/// by an adapter over an external cache (redis, memcached, ...).
///
/// There is deliberately no `delete`: 401 recovery overwrites the slot with
/// a fresh record rather than clearing it, so concurrent callers always see
/// either the old token or a new one, never a hole.
pub trait TokenCache: Send + Sync {
    fn read(&self, key: &str) -> Option<IdentityRecord>;
    fn write(&self, key: &str, record: IdentityRecord);
}

/// In-process map, the default backing store.
#[derive(Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, IdentityRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryCache {
    fn read(&self, key: &str) -> Option<IdentityRecord> {
        self.slots.lock().unwrap().get(key).cloned()
    }

    // Last writer wins. Two callers racing to refresh both produce valid
    // tokens, so no cross-call locking is needed.
    fn write(&self, key: &str, record: IdentityRecord) {
        self.slots.lock().unwrap().insert(key.to_owned(), record);
    }
}
