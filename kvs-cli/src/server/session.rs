//! The fixed pool of session workers and its slot bookkeeping.

use std::fs::File;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

use log::{debug, info, warn};

use kvs::error::{Error, KvResult};
use kvs::io::{read_frame, write_frame};
use kvs::notify::Sink;
use kvs::protocol::{decode_key, Opcode, Response, MAX_SESSION_COUNT, MAX_SUBSCRIPTIONS};
use kvs::store::{KvTable, MAX_KEY_LEN};
use kvs::subs::SubscriptionIndex;

/// The three pipes the registration endpoint opens for one client.
pub struct PipeTriple {
    pub request: File,
    pub response: File,
    pub notification: File,
}

/// Counting semaphore bounding session admission.
struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Semaphore { permits: Mutex::new(permits), cond: Condvar::new() }
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self.cond.wait(permits).unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    fn release(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += 1;
        self.cond.notify_one();
    }
}

/// Mutable state of one pre-allocated slot. Invariant: while inactive, all
/// handles are `None` and the key list is empty.
#[derive(Default)]
struct SlotState {
    active: bool,
    force_disconnect: bool,
    request: Option<File>,
    response: Option<File>,
    sink: Option<Sink>,
    keys: Vec<String>,
}

struct Slot {
    id: usize,
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl Slot {
    fn new(id: usize) -> Self {
        Slot { id, state: Mutex::new(SlotState::default()), cond: Condvar::new() }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn force_requested(&self) -> bool {
        self.lock().force_disconnect
    }
}

/// [`MAX_SESSION_COUNT`] slots, each owned by a dedicated worker thread.
///
/// Workers sleep on their slot's condvar until the registration endpoint
/// activates them, run the frame loop, and tear the session down on
/// DISCONNECT, pipe EOF/error, or a forced disconnect. The admission
/// semaphore makes the ninth registration block until a slot frees.
///
/// Only the owning worker ever clears `force_disconnect`; everyone else
/// (the registration thread on SIGUSR1) may only set it and wait.
pub struct SessionPool {
    slots: Vec<Arc<Slot>>,
    admission: Semaphore,
    manager: Mutex<()>,
    table: Arc<KvTable>,
    index: Arc<SubscriptionIndex>,
}

impl SessionPool {
    /// Spawns the fixed worker pool. Fatal when a worker cannot start.
    pub fn start(table: Arc<KvTable>, index: Arc<SubscriptionIndex>) -> KvResult<Arc<SessionPool>> {
        let pool = Arc::new(SessionPool {
            slots: (0..MAX_SESSION_COUNT).map(|id| Arc::new(Slot::new(id))).collect(),
            admission: Semaphore::new(MAX_SESSION_COUNT),
            manager: Mutex::new(()),
            table,
            index,
        });

        for slot in &pool.slots {
            let slot = slot.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name(format!("kvs-session-{}", slot.id))
                .spawn(move || pool.session_worker(&slot))
                .map_err(|err| {
                    Error::Internal(format!("failed to spawn session worker: {err}"))
                })?;
        }
        Ok(pool)
    }

    /// Blocks until a slot is free, installs the pipe triple and wakes the
    /// slot's worker.
    pub fn activate(&self, pipes: PipeTriple) -> KvResult<()> {
        self.admission.acquire();
        let _manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);

        let mut pipes = Some(pipes);
        for slot in &self.slots {
            let mut state = slot.lock();
            if state.active {
                continue;
            }
            if let Some(pipes) = pipes.take() {
                state.request = Some(pipes.request);
                state.response = Some(pipes.response);
                state.sink = Some(Sink::new(slot.id, pipes.notification));
                state.keys = Vec::new();
                state.active = true;
                slot.cond.notify_all();
                return Ok(());
            }
        }

        // The semaphore said a slot was free; not finding one is a bug.
        self.admission.release();
        Err(Error::Internal("no inactive session slot".to_string()))
    }

    /// Requests teardown of every active session and waits until each
    /// worker has finished it. Driven by SIGUSR1.
    pub fn disconnect_all(&self) {
        let mut marked = Vec::new();
        {
            let _manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in &self.slots {
                let mut state = slot.lock();
                if state.active {
                    state.force_disconnect = true;
                    marked.push(slot.clone());
                    slot.cond.notify_all();
                }
            }
        }

        for slot in marked {
            let mut state = slot.lock();
            while state.active || state.force_disconnect {
                state = slot.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
        info!("forced disconnect complete");
    }

    /// Number of currently active sessions.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.lock().active).count()
    }

    fn session_worker(&self, slot: &Slot) {
        loop {
            {
                let mut state = slot.lock();
                while !state.active && !state.force_disconnect {
                    state = slot.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                if !state.active {
                    // Forced while idle: nothing to tear down.
                    state.force_disconnect = false;
                    slot.cond.notify_all();
                    continue;
                }
            }
            self.run_session(slot);
        }
    }

    /// One activation: handshake, frame loop, teardown.
    fn run_session(&self, slot: &Slot) {
        let (mut request, mut response, sink) = {
            let mut state = slot.lock();
            match (state.request.take(), state.response.take(), state.sink.clone()) {
                (Some(request), Some(response), Some(sink)) => (request, response, sink),
                _ => {
                    warn!("slot {} activated without a full pipe triple", slot.id);
                    drop(state);
                    self.clear_slot(slot);
                    return;
                }
            }
        };

        // A forced disconnect may land the instant activation finishes;
        // honor it before the handshake goes out.
        if slot.force_requested() {
            debug!("slot {}: forced disconnect before the handshake", slot.id);
            self.teardown(slot, request, response, &sink, true);
            return;
        }

        if let Err(err) =
            write_frame(&mut response, &Response { op: Opcode::Connect, ok: true }.encode())
        {
            warn!("slot {}: failed to send connect response: {err}", slot.id);
            self.teardown(slot, request, response, &sink, true);
            return;
        }
        info!("client connected to session slot {}", slot.id);

        let mut client_gone = false;
        loop {
            if slot.force_requested() {
                client_gone = true;
                break;
            }

            let mut opcode = [0u8; 1];
            match read_frame(&mut request, &mut opcode, None) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("slot {}: client closed the request pipe", slot.id);
                    client_gone = true;
                    break;
                }
                Err(err) => {
                    warn!("slot {}: request pipe failed: {err}", slot.id);
                    client_gone = true;
                    break;
                }
            }

            match Opcode::from_digit(opcode[0]) {
                Ok(Opcode::Disconnect) => break,
                Ok(op @ (Opcode::Subscribe | Opcode::Unsubscribe)) => {
                    let mut field = [0u8; MAX_KEY_LEN];
                    match read_frame(&mut request, &mut field, None) {
                        Ok(true) => {}
                        Ok(false) | Err(_) => {
                            debug!("slot {}: client vanished mid-request", slot.id);
                            client_gone = true;
                            break;
                        }
                    }
                    let ok = match decode_key(&field) {
                        Ok(key) if op == Opcode::Subscribe => self.subscribe(slot, &sink, &key),
                        Ok(key) => self.unsubscribe(slot, &sink, &key),
                        Err(err) => {
                            warn!("slot {}: bad key field: {err}", slot.id);
                            false
                        }
                    };
                    if let Err(err) = write_frame(&mut response, &Response { op, ok }.encode()) {
                        warn!("slot {}: failed to send response: {err}", slot.id);
                    }
                }
                Ok(Opcode::Connect) => warn!("slot {}: unexpected connect frame", slot.id),
                Err(err) => warn!("slot {}: {err}", slot.id),
            }
        }

        self.teardown(slot, request, response, &sink, client_gone);
    }

    /// SUBSCRIBE validation, in protocol order: unknown key, full slot,
    /// duplicate. The slot's key list is the de-duplication point; the
    /// index itself takes whatever it is handed.
    fn subscribe(&self, slot: &Slot, sink: &Sink, key: &str) -> bool {
        if !self.table.exists(key) {
            warn!("slot {}: subscribe to a key that does not exist: {key:?}", slot.id);
            return false;
        }

        {
            let mut state = slot.lock();
            if state.keys.len() >= MAX_SUBSCRIPTIONS {
                warn!("slot {}: subscription limit reached", slot.id);
                return false;
            }
            if state.keys.iter().any(|k| k == key) {
                warn!("slot {}: already subscribed to {key:?}", slot.id);
                return false;
            }
            state.keys.push(key.to_string());
        }

        if let Err(err) = self.index.add(key, sink.clone()) {
            let mut state = slot.lock();
            if let Some(at) = state.keys.iter().position(|k| k == key) {
                state.keys.remove(at);
            }
            warn!("slot {}: {err}", slot.id);
            return false;
        }
        true
    }

    /// UNSUBSCRIBE: drop the slot entry (shifting, preserving order) and
    /// cancel one index occurrence.
    fn unsubscribe(&self, slot: &Slot, sink: &Sink, key: &str) -> bool {
        {
            let mut state = slot.lock();
            let Some(at) = state.keys.iter().position(|k| k == key) else {
                warn!("slot {}: not subscribed to {key:?}", slot.id);
                return false;
            };
            state.keys.remove(at);
        }
        self.index.remove(key, sink);
        true
    }

    /// Teardown, in protocol order: close the request pipe and the
    /// notification sink, emit the DISCONNECT response unless the client is
    /// already gone, close the response pipe, drop the index entries, clear
    /// the slot, release one admission permit.
    fn teardown(&self, slot: &Slot, request: File, mut response: File, sink: &Sink, client_gone: bool) {
        drop(request);
        // Closes the pipe under every clone, including the copies still in
        // the subscription index; no notification lands after this point.
        sink.close();

        if !client_gone {
            let frame = Response { op: Opcode::Disconnect, ok: true }.encode();
            if let Err(err) = write_frame(&mut response, &frame) {
                debug!("slot {}: disconnect response dropped: {err}", slot.id);
            }
        }
        drop(response);

        let keys = {
            let mut state = slot.lock();
            std::mem::take(&mut state.keys)
        };
        for key in &keys {
            self.index.remove(key, sink);
        }

        self.clear_slot(slot);
        info!("session slot {} released", slot.id);
    }

    fn clear_slot(&self, slot: &Slot) {
        {
            let mut state = slot.lock();
            state.request = None;
            state.response = None;
            state.sink = None;
            state.keys = Vec::new();
            state.active = false;
            state.force_disconnect = false;
            slot.cond.notify_all();
        }
        self.admission.release();
    }
}
