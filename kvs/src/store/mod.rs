pub mod table;

pub use table::KvTable;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, KvResult};

/// Number of bucket slots in the table and in the subscription index.
/// Prime, fixed for the process lifetime, so no resizing ever happens.
pub const NUM_BUCKETS: usize = 8191;

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 40;

/// Longest accepted value, in bytes.
pub const MAX_VALUE_LEN: usize = 256;

/// djb2 bucket hash: `h = 5381; h = h * 33 + byte`, reduced modulo
/// [`NUM_BUCKETS`]. Deterministic across runs, which keeps SHOW and backup
/// output stable for a given write sequence.
pub fn bucket_of(key: &str) -> usize {
    let mut hash: u64 = 5381;
    for byte in key.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    (hash % NUM_BUCKETS as u64) as usize
}

/// Checks the key size bounds (1..=[`MAX_KEY_LEN`] bytes).
pub fn validate_key(key: &str) -> KvResult<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidInput(format!(
            "key of {} bytes exceeds the {} byte limit",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Checks the value size bounds (1..=[`MAX_VALUE_LEN`] bytes).
pub fn validate_value(value: &str) -> KvResult<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput("empty value".to_string()));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(Error::InvalidInput(format!(
            "value of {} bytes exceeds the {} byte limit",
            value.len(),
            MAX_VALUE_LEN
        )));
    }
    Ok(())
}

/// A point-in-time description of the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The name of the storage engine.
    pub name: String,

    /// The number of live keys in the store.
    pub keys: u64,

    /// The logical size of live key/value pairs.
    pub size: u64,
}
