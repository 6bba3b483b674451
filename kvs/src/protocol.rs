//! Fixed-width frames exchanged over the session pipes.
//!
//! Every frame is NUL-padded ASCII. Opcodes travel as a single ASCII digit;
//! replies are two digits, `[opcode, status]`. The status digit is
//! asymmetric and must stay bit-exact: `0` means success for connect,
//! disconnect and unsubscribe, while `1` means success for subscribe.

use crate::error::{Error, KvResult};
use crate::store::MAX_KEY_LEN;

/// Size of the session pool; also bounds concurrently admitted clients.
pub const MAX_SESSION_COUNT: usize = 8;

/// Most keys one session may watch at a time.
pub const MAX_SUBSCRIPTIONS: usize = 10;

/// Longest pipe path carried in a CONNECT frame, in bytes.
pub const MAX_PIPE_PATH_LEN: usize = 40;

/// CONNECT frame: opcode digit plus three NUL-padded pipe paths.
pub const CONNECT_FRAME_LEN: usize = 1 + 3 * MAX_PIPE_PATH_LEN;

/// SUBSCRIBE/UNSUBSCRIBE frame: opcode digit plus a NUL-padded key.
pub const REQUEST_FRAME_LEN: usize = 1 + MAX_KEY_LEN;

/// Reply frame: `[opcode digit, status digit]`.
pub const RESPONSE_FRAME_LEN: usize = 2;

/// Notification frame: `(<key>,<value>)` NUL-padded to a fixed width.
pub const NOTIFICATION_FRAME_LEN: usize = 300;

/// Session opcodes, carried on the wire as the ASCII digits `1`..`4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Connect = 1,
    Disconnect = 2,
    Subscribe = 3,
    Unsubscribe = 4,
}

impl Opcode {
    /// The wire digit for this opcode.
    pub fn digit(self) -> u8 {
        b'0' + self as u8
    }

    /// Parses a wire digit back into an opcode.
    pub fn from_digit(byte: u8) -> KvResult<Opcode> {
        match byte {
            b'1' => Ok(Opcode::Connect),
            b'2' => Ok(Opcode::Disconnect),
            b'3' => Ok(Opcode::Subscribe),
            b'4' => Ok(Opcode::Unsubscribe),
            other => Err(Error::Protocol(format!("invalid opcode byte {other:#04x}"))),
        }
    }
}

/// A two-byte reply frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub op: Opcode,
    pub ok: bool,
}

impl Response {
    pub fn encode(self) -> [u8; RESPONSE_FRAME_LEN] {
        // Subscribe inverts the status digit. Protocol fact, not a choice.
        let status = match (self.op, self.ok) {
            (Opcode::Subscribe, true) => b'1',
            (Opcode::Subscribe, false) => b'0',
            (_, true) => b'0',
            (_, false) => b'1',
        };
        [self.op.digit(), status]
    }

    pub fn decode(frame: &[u8; RESPONSE_FRAME_LEN]) -> KvResult<Response> {
        let op = Opcode::from_digit(frame[0])?;
        let ok = match (op, frame[1]) {
            (Opcode::Subscribe, b'1') => true,
            (Opcode::Subscribe, b'0') => false,
            (_, b'0') => true,
            (_, b'1') => false,
            (_, other) => {
                return Err(Error::Protocol(format!("invalid status byte {other:#04x}")))
            }
        };
        Ok(Response { op, ok })
    }

    /// The raw status digit, as the original clients print it.
    pub fn status_digit(self) -> u8 {
        self.encode()[1] - b'0'
    }
}

/// The registration frame a client sends on the well-known FIFO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectFrame {
    pub request_path: String,
    pub response_path: String,
    pub notification_path: String,
}

impl ConnectFrame {
    pub fn encode(&self) -> KvResult<[u8; CONNECT_FRAME_LEN]> {
        let mut frame = [0u8; CONNECT_FRAME_LEN];
        frame[0] = Opcode::Connect.digit();
        pad_field(&mut frame[1..1 + MAX_PIPE_PATH_LEN], &self.request_path, "request path")?;
        pad_field(
            &mut frame[1 + MAX_PIPE_PATH_LEN..1 + 2 * MAX_PIPE_PATH_LEN],
            &self.response_path,
            "response path",
        )?;
        pad_field(
            &mut frame[1 + 2 * MAX_PIPE_PATH_LEN..],
            &self.notification_path,
            "notification path",
        )?;
        Ok(frame)
    }

    pub fn decode(frame: &[u8; CONNECT_FRAME_LEN]) -> KvResult<ConnectFrame> {
        let op = Opcode::from_digit(frame[0])?;
        if op != Opcode::Connect {
            return Err(Error::Protocol(format!(
                "expected a connect frame, got opcode {op:?}"
            )));
        }
        Ok(ConnectFrame {
            request_path: field_text(&frame[1..1 + MAX_PIPE_PATH_LEN])?,
            response_path: field_text(&frame[1 + MAX_PIPE_PATH_LEN..1 + 2 * MAX_PIPE_PATH_LEN])?,
            notification_path: field_text(&frame[1 + 2 * MAX_PIPE_PATH_LEN..])?,
        })
    }
}

/// Builds a SUBSCRIBE or UNSUBSCRIBE frame.
pub fn encode_request(op: Opcode, key: &str) -> KvResult<[u8; REQUEST_FRAME_LEN]> {
    if !matches!(op, Opcode::Subscribe | Opcode::Unsubscribe) {
        return Err(Error::Protocol(format!("opcode {op:?} carries no key")));
    }
    let mut frame = [0u8; REQUEST_FRAME_LEN];
    frame[0] = op.digit();
    pad_field(&mut frame[1..], key, "key")?;
    Ok(frame)
}

/// Extracts the key from a NUL-padded request field.
pub fn decode_key(field: &[u8; MAX_KEY_LEN]) -> KvResult<String> {
    let key = field_text(field)?;
    if key.is_empty() {
        return Err(Error::Protocol("empty key field".to_string()));
    }
    Ok(key)
}

fn pad_field(dst: &mut [u8], src: &str, what: &str) -> KvResult<()> {
    if src.is_empty() || src.len() > dst.len() {
        return Err(Error::Protocol(format!(
            "{what} of {} bytes does not fit a {} byte field",
            src.len(),
            dst.len()
        )));
    }
    dst[..src.len()].copy_from_slice(src.as_bytes());
    Ok(())
}

/// Reads a NUL-padded field back: bytes up to the first NUL, with trailing
/// whitespace trimmed the way the registration endpoint always has.
fn field_text(raw: &[u8]) -> KvResult<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = std::str::from_utf8(&raw[..end])
        .map_err(|_| Error::Protocol("non-utf8 frame field".to_string()))?;
    Ok(text.trim_end().to_string())
}
