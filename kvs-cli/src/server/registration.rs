//! The registration endpoint: accepts CONNECT frames on the well-known
//! FIFO and hands pipe triples to the session pool.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use kvs::error::KvResult;
use kvs::io::{create_fifo, open_read, open_write, read_frame, remove_fifo, write_frame};
use kvs::protocol::{ConnectFrame, Opcode, Response, CONNECT_FRAME_LEN};

use crate::server::session::{PipeTriple, SessionPool};

pub struct RegistrationEndpoint {
    fifo_path: PathBuf,
    pool: Arc<SessionPool>,
    shutdown: Arc<AtomicBool>,
}

impl RegistrationEndpoint {
    /// `shutdown` is the SIGUSR1 flag; raising it makes the accept loop run
    /// a forced disconnect of every session at the next opportunity.
    pub fn new(fifo_path: &Path, pool: Arc<SessionPool>, shutdown: Arc<AtomicBool>) -> Self {
        RegistrationEndpoint { fifo_path: fifo_path.to_path_buf(), pool, shutdown }
    }

    /// Creates the well-known FIFO, replacing any stale one. Fatal on
    /// failure.
    pub fn create_fifo(&self) -> KvResult<()> {
        remove_fifo(&self.fifo_path)?;
        create_fifo(&self.fifo_path)
    }

    /// The accept loop. Blocks forever; an `Err` means the FIFO itself is
    /// beyond recovery and the process should exit.
    pub fn run(&self) -> KvResult<()> {
        let mut fifo = open_read(&self.fifo_path)?;
        info!("registration endpoint listening on {}", self.fifo_path.display());

        loop {
            if self.shutdown.swap(false, Ordering::SeqCst) {
                info!("SIGUSR1: disconnecting all sessions");
                self.pool.disconnect_all();
            }

            let mut frame = [0u8; CONNECT_FRAME_LEN];
            match read_frame(&mut fifo, &mut frame, Some(&self.shutdown)) {
                Ok(true) => {}
                Ok(false) => {
                    // All writers left; reopen and block for the next one.
                    debug!("registration FIFO drained, reopening");
                    fifo = open_read(&self.fifo_path)?;
                    continue;
                }
                Err(err) => {
                    if self.shutdown.swap(false, Ordering::SeqCst) {
                        info!("SIGUSR1: disconnecting all sessions");
                        self.pool.disconnect_all();
                    } else {
                        warn!("registration FIFO read failed: {err}");
                    }
                    continue;
                }
            }

            match ConnectFrame::decode(&frame) {
                Ok(connect) => self.admit(connect),
                Err(err) => warn!("discarding malformed connect frame: {err}"),
            }
        }
    }

    /// Opens the client's pipes — response first so failures can be
    /// reported — then activates a slot. Blocks on the admission semaphore
    /// while the pool is full.
    fn admit(&self, connect: ConnectFrame) {
        let mut response = match open_write(Path::new(&connect.response_path)) {
            Ok(file) => file,
            Err(err) => {
                warn!("failed to open response pipe: {err}");
                return;
            }
        };

        let request = match open_read(Path::new(&connect.request_path)) {
            Ok(file) => file,
            Err(err) => {
                warn!("failed to open request pipe: {err}");
                refuse(&mut response);
                return;
            }
        };

        let notification = match open_write(Path::new(&connect.notification_path)) {
            Ok(file) => file,
            Err(err) => {
                warn!("failed to open notification pipe: {err}");
                refuse(&mut response);
                return;
            }
        };

        if let Err(err) = self.pool.activate(PipeTriple { request, response, notification }) {
            warn!("failed to activate session: {err}");
        }
    }
}

fn refuse(response: &mut File) {
    let frame = Response { op: Opcode::Connect, ok: false }.encode();
    if let Err(err) = write_frame(response, &frame) {
        warn!("failed to send the connect error response: {err}");
    }
}
