use std::fmt::{Display, Formatter};

/// Result type returned by every fallible kvs operation.
pub type KvResult<T> = std::result::Result<T, Error>;

/// kvs errors.
///
/// All variants carry a rendered message rather than a source error so that
/// values stay `Clone` and can cross thread boundaries freely. Recoverable
/// failures are reported through `Err`; nothing in the library aborts the
/// process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A script command that could not be parsed or validated.
    InvalidCommand(String),

    /// Rejected input, e.g. a key or value outside the size bounds.
    InvalidInput(String),

    /// An underlying I/O failure (file, pipe or FIFO).
    Io(String),

    /// A malformed or unexpected IPC frame.
    Protocol(String),

    /// A broken internal invariant. Should not happen.
    Internal(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidCommand(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err, Error::Io("gone".to_string()));
    }

    #[test]
    fn display_includes_kind() {
        let err = Error::Protocol("short frame".to_string());
        assert_eq!(err.to_string(), "protocol error: short frame");
    }
}
