use std::sync::{PoisonError, RwLock};

use crate::error::{Error, KvResult};
use crate::notify::Sink;
use crate::protocol::MAX_SESSION_COUNT;
use crate::store::{bucket_of, NUM_BUCKETS};

/// Key → notification sinks, with the same bucket layout and hash as the
/// store itself.
///
/// A bucket holds a flat list of sinks with room for one entry per session
/// slot. The list is keyed by the bucket, not the key: two keys that collide
/// into one bucket share a sink list, exactly as the wire protocol has
/// always behaved. De-duplication is not enforced here — the session slot's
/// subscribed-key list guarantees one entry per (key, session).
pub struct SubscriptionIndex {
    buckets: Vec<RwLock<Vec<Sink>>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        SubscriptionIndex {
            buckets: (0..NUM_BUCKETS)
                .map(|_| RwLock::new(Vec::with_capacity(MAX_SESSION_COUNT)))
                .collect(),
        }
    }

    /// Registers a sink under the key's bucket.
    pub fn add(&self, key: &str, sink: Sink) -> KvResult<()> {
        let mut sinks = self.bucket_mut(key);
        if sinks.len() >= MAX_SESSION_COUNT {
            return Err(Error::Internal(format!(
                "subscription bucket for {key:?} is full"
            )));
        }
        sinks.push(sink);
        Ok(())
    }

    /// Cancels one occurrence of the sink, swapping the last entry into its
    /// place. Returns whether an occurrence was found.
    pub fn remove(&self, key: &str, sink: &Sink) -> bool {
        let mut sinks = self.bucket_mut(key);
        match sinks.iter().position(|s| s.same_handle(sink)) {
            Some(at) => {
                sinks.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// A caller-owned copy of the key's sink list, so no bucket lock is held
    /// while notifications are written to (possibly slow) pipes.
    pub fn sinks(&self, key: &str) -> Vec<Sink> {
        self.bucket(key).clone()
    }

    fn bucket(&self, key: &str) -> std::sync::RwLockReadGuard<'_, Vec<Sink>> {
        self.buckets[bucket_of(key)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bucket_mut(&self, key: &str) -> std::sync::RwLockWriteGuard<'_, Vec<Sink>> {
        self.buckets[bucket_of(key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SubscriptionIndex {
    fn default() -> Self {
        SubscriptionIndex::new()
    }
}
