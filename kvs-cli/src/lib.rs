//! `kvscli` wires the `kvs` engine into executables: `kvs-batch` runs `.job`
//! scripts from a directory through a worker pool, `kvs-server` does the
//! same while serving pipe sessions with key-change notifications, and
//! `kvs-client` is the interactive counterpart.
//!
//! ## Getting started
//!
//! ```doc
//! ❯ kvs-batch jobs/ 2 4
//! ❯ cat jobs/orders.out
//! [(order1,shipped)(order2,pending)]
//!
//! ❯ kvs-server jobs/ 4 2 registry &
//! ❯ kvs-client 7 registry
//! Server returned 0 for operation: connect
//! SUBSCRIBE [order1]
//! Server returned 1 for operation: subscribe
//! (order1,cancelled)
//! DISCONNECT
//! Disconnected from server
//! ```

pub mod ast;
pub mod client;
pub mod config;
pub mod jobs;
pub mod server;
pub mod trace;
