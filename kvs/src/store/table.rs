use std::io::Write;
use std::sync::{PoisonError, RwLock};

use crate::error::KvResult;
use crate::store::{bucket_of, validate_key, validate_value, Status, NUM_BUCKETS};

/// Observer invoked after a successful mutation, with the key and the new
/// value (writes) or the [`TOMBSTONE`] marker (deletes).
pub type MutationObserver = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Marker handed to the delete observer in place of a value.
pub const TOMBSTONE: &str = "DELETED";

/// The in-memory key/value store.
///
/// A fixed array of [`NUM_BUCKETS`] chains, each guarded by its own
/// reader/writer lock; a chain keeps pairs in insertion order, and an
/// overwrite replaces the value in place. Since the bucket count never
/// changes there is no table-level lock to take on the hot path.
///
/// Mutation observers are installed once at startup (by the session side)
/// and fire after the store state is updated, outside the bucket lock, so a
/// slow or blocking observer never holds up readers of the same bucket.
pub struct KvTable {
    buckets: Vec<RwLock<Vec<(String, String)>>>,
    on_write: RwLock<Option<MutationObserver>>,
    on_delete: RwLock<Option<MutationObserver>>,
}

impl KvTable {
    /// Creates an empty table with all [`NUM_BUCKETS`] chains allocated.
    pub fn new() -> Self {
        KvTable {
            buckets: (0..NUM_BUCKETS).map(|_| RwLock::new(Vec::new())).collect(),
            on_write: RwLock::new(None),
            on_delete: RwLock::new(None),
        }
    }

    /// Installs the write observer. Call once, before concurrent use.
    pub fn register_write_observer(&self, observer: MutationObserver) {
        *self
            .on_write
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Installs the delete observer. Call once, before concurrent use.
    pub fn register_delete_observer(&self, observer: MutationObserver) {
        *self
            .on_delete
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Inserts or overwrites a pair, then fires the write observer.
    pub fn put(&self, key: &str, value: &str) -> KvResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        {
            let mut chain = self.chain_mut(key);
            match chain.iter_mut().find(|(k, _)| k == key) {
                Some(pair) => pair.1 = value.to_string(),
                None => chain.push((key.to_string(), value.to_string())),
            }
        }
        self.fire(&self.on_write, key, value);
        Ok(())
    }

    /// Returns the current value for a key, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.chain(key)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Presence test without side effects.
    pub fn exists(&self, key: &str) -> bool {
        self.chain(key).iter().any(|(k, _)| k == key)
    }

    /// Removes a pair if present and reports whether one existed. Fires the
    /// delete observer with the [`TOMBSTONE`] marker on actual removal.
    pub fn delete(&self, key: &str) -> bool {
        let existed = {
            let mut chain = self.chain_mut(key);
            match chain.iter().position(|(k, _)| k == key) {
                Some(at) => {
                    chain.remove(at);
                    true
                }
                None => false,
            }
        };
        if existed {
            self.fire(&self.on_delete, key, TOMBSTONE);
        }
        existed
    }

    /// A deep copy of every pair, in bucket-index order and chain-insertion
    /// order within each bucket. The unit of work a backup snapshots.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for bucket in &self.buckets {
            let chain = bucket.read().unwrap_or_else(PoisonError::into_inner);
            pairs.extend(chain.iter().cloned());
        }
        pairs
    }

    /// Dumps every pair as `(key, value)\n` lines, in the same order as
    /// [`KvTable::snapshot`]. This is the SHOW and backup-file format.
    pub fn snapshot_to(&self, out: &mut dyn Write) -> KvResult<()> {
        for bucket in &self.buckets {
            let chain = bucket.read().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in chain.iter() {
                writeln!(out, "({key}, {value})")?;
            }
        }
        Ok(())
    }

    /// Live-key counters for diagnostics.
    pub fn status(&self) -> Status {
        let mut keys = 0u64;
        let mut size = 0u64;
        for bucket in &self.buckets {
            let chain = bucket.read().unwrap_or_else(PoisonError::into_inner);
            keys += chain.len() as u64;
            size += chain
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>();
        }
        Status { name: "memory".to_string(), keys, size }
    }

    fn chain(&self, key: &str) -> std::sync::RwLockReadGuard<'_, Vec<(String, String)>> {
        self.buckets[bucket_of(key)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn chain_mut(&self, key: &str) -> std::sync::RwLockWriteGuard<'_, Vec<(String, String)>> {
        self.buckets[bucket_of(key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, slot: &RwLock<Option<MutationObserver>>, key: &str, value: &str) {
        let observer = slot.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(observer) = observer.as_ref() {
            observer(key, value);
        }
    }
}

impl Default for KvTable {
    fn default() -> Self {
        KvTable::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn point_ops() -> KvResult<()> {
        let table = KvTable::new();

        // Getting a missing key should return None.
        assert_eq!(table.get("a"), None);
        assert!(!table.exists("a"));

        // Setting and getting a key should return its value.
        table.put("a", "1")?;
        assert_eq!(table.get("a"), Some("1".to_string()));
        assert!(table.exists("a"));

        // Setting a different key should not affect the first.
        table.put("b", "2")?;
        assert_eq!(table.get("b"), Some("2".to_string()));
        assert_eq!(table.get("a"), Some("1".to_string()));

        // Overwrites replace in place.
        table.put("a", "3")?;
        assert_eq!(table.get("a"), Some("3".to_string()));

        // Deletes report whether the pair existed.
        assert!(table.delete("a"));
        assert!(!table.delete("a"));
        assert_eq!(table.get("a"), None);

        Ok(())
    }

    #[test]
    fn rejects_oversized_input() {
        let table = KvTable::new();
        assert!(table.put(&"k".repeat(41), "v").is_err());
        assert!(table.put("k", &"v".repeat(257)).is_err());
        assert!(table.put("", "v").is_err());
        assert_eq!(table.status().keys, 0);
    }

    #[test]
    fn snapshot_reflects_overwrites() -> KvResult<()> {
        let table = KvTable::new();
        table.put("k2", "b")?;
        table.put("k1", "a")?;
        table.put("k2", "c")?;

        let mut out = Vec::new();
        table.snapshot_to(&mut out)?;
        let dump = String::from_utf8(out).expect("snapshot is utf-8");
        assert!(dump.contains("(k1, a)\n"));
        assert!(dump.contains("(k2, c)\n"));
        assert!(!dump.contains("(k2, b)"));

        // The deep copy sees the same pairs as the textual dump.
        let pairs = table.snapshot();
        assert_eq!(pairs.len(), 2);
        Ok(())
    }

    #[test]
    fn observers_fire_after_mutation() -> KvResult<()> {
        let table = KvTable::new();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let deletes = Arc::new(AtomicUsize::new(0));

        let seen = writes.clone();
        table.register_write_observer(Box::new(move |key, value| {
            seen.lock().unwrap().push((key.to_string(), value.to_string()));
        }));
        let count = deletes.clone();
        table.register_delete_observer(Box::new(move |_, marker| {
            assert_eq!(marker, TOMBSTONE);
            count.fetch_add(1, Ordering::SeqCst);
        }));

        table.put("k", "v1")?;
        table.put("k", "v2")?;
        table.delete("k");
        table.delete("k"); // no pair, no observer

        assert_eq!(
            *writes.lock().unwrap(),
            vec![
                ("k".to_string(), "v1".to_string()),
                ("k".to_string(), "v2".to_string())
            ]
        );
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn status_counts_live_pairs() -> KvResult<()> {
        let table = KvTable::new();
        table.put("a", "12")?;
        table.put("bb", "3")?;
        let status = table.status();
        assert_eq!(status.keys, 2);
        assert_eq!(status.size, 6);
        assert_eq!(status.name, "memory");
        Ok(())
    }
}
