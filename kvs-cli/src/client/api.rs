//! The client side of the session protocol.

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use kvs::error::{Error, KvResult};
use kvs::io::{create_fifo, open_read, open_write, read_frame, remove_fifo, write_frame};
use kvs::protocol::{
    encode_request, ConnectFrame, Opcode, Response, NOTIFICATION_FRAME_LEN, RESPONSE_FRAME_LEN,
};

use crate::config::ClientSettings;

/// A live session: the request/response pipe pair plus the notification
/// listener thread.
///
/// The listener reads a duplicated descriptor, so the session can be torn
/// down without racing it; it exits on its own when the server closes the
/// notification pipe during teardown.
pub struct ClientSession {
    settings: ClientSettings,
    request: File,
    response: File,
    listener: Option<JoinHandle<()>>,
    server_gone: Arc<AtomicBool>,
}

impl ClientSession {
    /// Creates the pipe triple, registers over the well-known FIFO and
    /// completes the CONNECT handshake.
    pub fn connect(settings: &ClientSettings) -> KvResult<ClientSession> {
        let paths =
            [settings.request_path(), settings.response_path(), settings.notification_path()];
        for path in &paths {
            remove_fifo(path)?;
            create_fifo(path)?;
        }

        let connect = ConnectFrame {
            request_path: path_text(&paths[0])?,
            response_path: path_text(&paths[1])?,
            notification_path: path_text(&paths[2])?,
        };
        {
            let mut registry = open_write(&settings.registration_path())?;
            write_frame(&mut registry, &connect.encode()?)?;
        }

        // Open order mirrors the server's: response, request, notification.
        let mut response = open_read(&paths[1])?;
        let request = open_write(&paths[0])?;
        let notification = open_read(&paths[2])?;

        let reply = read_response(&mut response, Opcode::Connect)?;
        if !reply.ok {
            return Err(Error::Protocol("server refused the connection".to_string()));
        }

        let server_gone = Arc::new(AtomicBool::new(false));
        let listener = spawn_listener(notification, server_gone.clone())?;

        Ok(ClientSession {
            settings: settings.clone(),
            request,
            response,
            listener: Some(listener),
            server_gone,
        })
    }

    /// Whether the listener saw the server close the notification pipe.
    pub fn server_gone(&self) -> bool {
        self.server_gone.load(Ordering::SeqCst)
    }

    /// SUBSCRIBE; `Ok(false)` is the server's validation refusal.
    pub fn subscribe(&mut self, key: &str) -> KvResult<bool> {
        self.request(Opcode::Subscribe, key)
    }

    /// UNSUBSCRIBE; `Ok(false)` when this session never subscribed the key.
    pub fn unsubscribe(&mut self, key: &str) -> KvResult<bool> {
        self.request(Opcode::Unsubscribe, key)
    }

    fn request(&mut self, op: Opcode, key: &str) -> KvResult<bool> {
        if self.server_gone() {
            return Err(Error::Protocol("server disconnected".to_string()));
        }
        write_frame(&mut self.request, &encode_request(op, key)?)?;
        let reply = read_response(&mut self.response, op)?;
        Ok(reply.ok)
    }

    /// Sends DISCONNECT, waits for the response and the listener, then
    /// removes the pipes. Consuming `self` keeps the transition single-shot.
    pub fn disconnect(mut self) -> KvResult<()> {
        let outcome = self.send_disconnect();

        // The server's teardown closes the notification pipe, which is what
        // stops the listener; join after the handshake, not before.
        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                warn!("notification listener panicked");
            }
        }

        for path in [
            self.settings.request_path(),
            self.settings.response_path(),
            self.settings.notification_path(),
        ] {
            if let Err(err) = remove_fifo(&path) {
                debug!("failed to remove {}: {err}", path.display());
            }
        }
        outcome
    }

    fn send_disconnect(&mut self) -> KvResult<()> {
        if let Err(err) = write_frame(&mut self.request, &[Opcode::Disconnect.digit()]) {
            // The server tore the session down first; nothing left to say.
            debug!("disconnect frame dropped: {err}");
            return Ok(());
        }
        match read_response(&mut self.response, Opcode::Disconnect) {
            Ok(reply) if reply.ok => Ok(()),
            Ok(_) => Err(Error::Protocol("server failed to disconnect".to_string())),
            // The server may already have closed the pipe; that is a
            // completed disconnect from our side.
            Err(err) => {
                debug!("no disconnect response: {err}");
                Ok(())
            }
        }
    }
}

/// Reads one response frame, prints the status line the way the original
/// client always has, and checks the echoed opcode.
fn read_response(response: &mut File, expected: Opcode) -> KvResult<Response> {
    let mut frame = [0u8; RESPONSE_FRAME_LEN];
    if !read_frame(response, &mut frame, None)? {
        return Err(Error::Protocol("response pipe closed".to_string()));
    }
    let reply = Response::decode(&frame)?;
    if reply.op != expected {
        return Err(Error::Protocol(format!(
            "expected a {expected:?} response, got {:?}",
            reply.op
        )));
    }
    println!(
        "Server returned {} for operation: {}",
        reply.status_digit(),
        operation_name(expected)
    );
    Ok(reply)
}

fn operation_name(op: Opcode) -> &'static str {
    match op {
        Opcode::Connect => "connect",
        Opcode::Disconnect => "disconnect",
        Opcode::Subscribe => "subscribe",
        Opcode::Unsubscribe => "unsubscribe",
    }
}

fn spawn_listener(notification: File, server_gone: Arc<AtomicBool>) -> KvResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("kvs-notifications".to_string())
        .spawn(move || listen(notification, &server_gone))
        .map_err(|err| Error::Internal(format!("failed to spawn the listener: {err}")))
}

fn listen(mut notification: File, server_gone: &AtomicBool) {
    loop {
        let mut frame = [0u8; NOTIFICATION_FRAME_LEN];
        match read_frame(&mut notification, &mut frame, None) {
            Ok(true) => println!("{}", render_notification(&frame)),
            Ok(false) => {
                server_gone.store(true, Ordering::SeqCst);
                debug!("notification pipe closed");
                return;
            }
            Err(err) => {
                warn!("failed to read from the notification pipe: {err}");
                server_gone.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// NULs render as spaces and trailing whitespace is trimmed for display.
fn render_notification(frame: &[u8]) -> String {
    let text: String =
        frame.iter().map(|&b| if b == 0 { ' ' } else { char::from(b) }).collect();
    text.trim_end().to_string()
}

fn path_text(path: &std::path::Path) -> KvResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("non-utf8 pipe path {}", path.display())))
}
