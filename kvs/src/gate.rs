use std::sync::{Condvar, Mutex, PoisonError};

/// Script-level command gate.
///
/// Two classes of entrants: readers (READ, SHOW, BACKUP) and writers (WRITE,
/// DELETE). Members of the same class stack freely; the two classes exclude
/// each other. This is deliberately not a reader/writer lock — several
/// writers run concurrently, and per-key safety comes from the table's
/// bucket locks, not from here. The gate only keeps whole commands of
/// opposing classes from interleaving.
///
/// An arrival for an empty class blocks until the opposing class drains.
/// There is no stronger fairness guarantee than the condvar's wakeup order.
pub struct CommandGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    readers: usize,
    writers: usize,
}

impl CommandGate {
    pub fn new() -> Self {
        CommandGate { state: Mutex::new(GateState::default()), cond: Condvar::new() }
    }

    /// Blocks until no writer is active, then joins the reader class.
    pub fn enter_read(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.writers > 0 {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.readers += 1;
    }

    /// Leaves the reader class and wakes blocked arrivals.
    pub fn leave_read(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.readers -= 1;
        self.cond.notify_all();
    }

    /// Blocks until no reader is active, then joins the writer class.
    pub fn enter_write(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.readers > 0 {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.writers += 1;
    }

    /// Leaves the writer class and wakes blocked arrivals.
    pub fn leave_write(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writers -= 1;
        self.cond.notify_all();
    }

    /// Reader-class entry as an RAII pass.
    pub fn read_pass(&self) -> ReadPass<'_> {
        self.enter_read();
        ReadPass { gate: self }
    }

    /// Writer-class entry as an RAII pass.
    pub fn write_pass(&self) -> WritePass<'_> {
        self.enter_write();
        WritePass { gate: self }
    }

    #[cfg(test)]
    fn counters(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.readers, state.writers)
    }
}

impl Default for CommandGate {
    fn default() -> Self {
        CommandGate::new()
    }
}

/// Holds a reader-class slot until dropped.
pub struct ReadPass<'a> {
    gate: &'a CommandGate,
}

impl Drop for ReadPass<'_> {
    fn drop(&mut self) {
        self.gate.leave_read();
    }
}

/// Holds a writer-class slot until dropped.
pub struct WritePass<'a> {
    gate: &'a CommandGate,
}

impl Drop for WritePass<'_> {
    fn drop(&mut self) {
        self.gate.leave_write();
    }
}
