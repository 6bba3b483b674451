//! Blocking I/O helpers for pipes, FIFOs and output files.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, KvResult};

/// Reads exactly `frame.len()` bytes.
///
/// Returns `Ok(true)` once the frame is filled and `Ok(false)` when the
/// writer side is gone (end of file). Interrupted reads are retried, unless
/// `stop` is raised, in which case the interruption surfaces as an error so
/// the caller can run its shutdown path.
pub fn read_frame(
    reader: &mut impl Read,
    frame: &mut [u8],
    stop: Option<&AtomicBool>,
) -> KvResult<bool> {
    let mut filled = 0;
    while filled < frame.len() {
        match reader.read(&mut frame[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                if stop.map_or(false, |flag| flag.load(Ordering::SeqCst)) {
                    return Err(Error::Io("read interrupted by shutdown".to_string()));
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

/// Writes a whole frame. `write_all` already retries interruptions.
pub fn write_frame(writer: &mut impl Write, frame: &[u8]) -> KvResult<()> {
    writer.write_all(frame)?;
    Ok(())
}

/// Creates a FIFO special file with mode `0640`.
pub fn create_fifo(path: &Path) -> KvResult<()> {
    let raw = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("path {} contains NUL", path.display())))?;
    // SAFETY: `raw` is a valid NUL-terminated path for the duration of the call.
    let rc = unsafe { libc::mkfifo(raw.as_ptr(), 0o640) };
    if rc != 0 {
        return Err(Error::Io(format!(
            "mkfifo {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Removes a FIFO (or any file) if it exists.
pub fn remove_fifo(path: &Path) -> KvResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Opens for reading. On a FIFO this blocks until a writer appears.
pub fn open_read(path: &Path) -> KvResult<File> {
    OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|err| Error::Io(format!("open {} for reading: {err}", path.display())))
}

/// Opens for writing. On a FIFO this blocks until a reader appears.
pub fn open_write(path: &Path) -> KvResult<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|err| Error::Io(format!("open {} for writing: {err}", path.display())))
}

/// Creates (or truncates) an output file, `.out`/`.bck` semantics.
pub fn create_truncate(path: &Path) -> KvResult<File> {
    File::create(path)
        .map_err(|err| Error::Io(format!("create {}: {err}", path.display())))
}
