//! `kvs` is a concurrent in-memory key-value store with two faces sharing one
//! storage engine: a batch side that executes `.job` command scripts from a
//! directory through a worker pool, and an interactive side that serves
//! long-lived client sessions over named pipes, pushing notifications to
//! subscribers whenever a key they watch is written or deleted.
//!
//! The library holds the engine and its plumbing: the bucket-locked
//! [`store::KvTable`], the reader/writer [`gate::CommandGate`] that orders
//! script commands, the [`subs::SubscriptionIndex`] and notification fan-out,
//! the [`script::Executor`], the [`backup::BackupCoordinator`] and the
//! fixed-width pipe [`protocol`]. The executables and their adapters (script
//! tokenizer, directory dispatcher, session manager, client) live in the
//! `kvscli` crate.
//!
//! ## Getting started
//!
//! ```rust
//! use kvs::error::KvResult;
//! use kvs::store::KvTable;
//!
//! fn main() {
//!     run().unwrap();
//! }
//!
//! fn run() -> KvResult<()> {
//!     let table = KvTable::new();
//!
//!     table.put("order_key", "pending")?;
//!     table.put("order_key", "shipped")?;
//!     assert_eq!(table.get("order_key"), Some("shipped".to_string()));
//!
//!     assert!(table.delete("order_key"));
//!     assert_eq!(table.get("order_key"), None);
//!
//!     let mut dump = Vec::new();
//!     table.put("a", "1")?;
//!     table.snapshot_to(&mut dump)?;
//!     assert_eq!(dump, b"(a, 1)\n");
//!
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod error;
pub mod gate;
pub mod io;
pub mod notify;
pub mod protocol;
pub mod script;
pub mod store;
pub mod subs;
