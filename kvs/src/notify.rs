//! Notification fan-out: turns table mutations into fixed-width frames on
//! subscriber pipes.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::protocol::NOTIFICATION_FRAME_LEN;
use crate::store::KvTable;
use crate::subs::SubscriptionIndex;

/// Write-only handle to one session's notification pipe.
///
/// Clones share the pipe; identity is per activation (the shared allocation,
/// not the slot id), so removing a sink from the subscription index cancels
/// exactly one registration even after the slot has been reused.
///
/// [`Sink::close`] shuts the pipe for every clone at once. Teardown relies
/// on this: stale copies still sitting in the subscription index must not
/// keep the descriptor alive.
#[derive(Clone)]
pub struct Sink {
    slot: usize,
    pipe: Arc<Mutex<Option<File>>>,
}

impl Sink {
    /// Wraps a freshly opened notification pipe for the given session slot.
    pub fn new(slot: usize, pipe: File) -> Self {
        Sink { slot, pipe: Arc::new(Mutex::new(Some(pipe))) }
    }

    /// The session slot this sink belongs to. Diagnostic only.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether two sinks are the same activation's handle.
    pub fn same_handle(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.pipe, &other.pipe)
    }

    /// Writes one frame to the pipe.
    pub fn send(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut pipe = self.pipe.lock().unwrap_or_else(PoisonError::into_inner);
        match pipe.as_mut() {
            Some(pipe) => pipe.write_all(frame),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "notification pipe already closed",
            )),
        }
    }

    /// Closes the underlying pipe, for this handle and every clone of it.
    /// Later sends fail instead of reaching a dead session.
    pub fn close(&self) {
        let mut pipe = self.pipe.lock().unwrap_or_else(PoisonError::into_inner);
        *pipe = None;
    }
}

/// Formats the fixed-width `(<key>,<value>)` notification frame.
pub fn notification_frame(key: &str, value: &str) -> [u8; NOTIFICATION_FRAME_LEN] {
    let mut frame = [0u8; NOTIFICATION_FRAME_LEN];
    let text = format!("({key},{value})");
    let len = text.len().min(NOTIFICATION_FRAME_LEN);
    frame[..len].copy_from_slice(&text.as_bytes()[..len]);
    frame
}

/// Installs the write and delete observers that feed the fan-out.
///
/// Called once at server startup, before any session is admitted. Both
/// observers snapshot the sink list for the key and then deliver without
/// holding any index lock; a failed write to one sink is logged and does
/// not affect the mutation or the other subscribers.
pub fn install(table: &KvTable, index: Arc<SubscriptionIndex>) {
    let writes = index.clone();
    table.register_write_observer(Box::new(move |key, value| deliver(&writes, key, value)));
    table.register_delete_observer(Box::new(move |key, marker| deliver(&index, key, marker)));
}

fn deliver(index: &SubscriptionIndex, key: &str, value: &str) {
    let sinks = index.sinks(key);
    if sinks.is_empty() {
        return;
    }
    let frame = notification_frame(key, value);
    for sink in sinks {
        if let Err(err) = sink.send(&frame) {
            warn!("failed to notify session {}: {err}", sink.slot());
        }
    }
}
