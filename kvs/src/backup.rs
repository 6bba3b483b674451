use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::{Error, KvResult};
use crate::io::create_truncate;

/// Caps concurrent snapshot writers and reaps them.
///
/// All reaping lives here: admission reaps synchronously when the cap is
/// reached, [`BackupCoordinator::reap_finished`] collects whatever is done
/// without blocking, and [`BackupCoordinator::drain`] joins everything at
/// script completion. A snapshot writer owns a deep copy taken under the
/// reader side of the command gate, so it shares no state with the store
/// and runs to completion on its own.
pub struct BackupCoordinator {
    max_live: usize,
    live: Mutex<Vec<JoinHandle<()>>>,
}

impl BackupCoordinator {
    /// `max_live` is the `max_backups` CLI bound; must be at least 1.
    pub fn new(max_live: usize) -> Self {
        BackupCoordinator { max_live: max_live.max(1), live: Mutex::new(Vec::new()) }
    }

    /// Admits one snapshot and starts its writer.
    ///
    /// When `max_live` writers are outstanding this blocks until one has
    /// been reaped, holding the admission lock so competing BACKUPs queue
    /// behind the reap, then spawns a thread that dumps the snapshot to
    /// `path` in SHOW format.
    pub fn spawn(&self, snapshot: Vec<(String, String)>, path: &Path) -> KvResult<()> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        while live.len() >= self.max_live {
            let oldest = live.remove(0);
            join_writer(oldest);
        }

        let target: PathBuf = path.to_path_buf();
        let writer = thread::Builder::new()
            .name("kvs-backup".to_string())
            .spawn(move || {
                if let Err(err) = write_snapshot(&snapshot, &target) {
                    warn!("backup to {} failed: {err}", target.display());
                } else {
                    debug!("backup written to {}", target.display());
                }
            })
            .map_err(|err| Error::Internal(format!("failed to spawn backup writer: {err}")))?;
        live.push(writer);
        Ok(())
    }

    /// Reaps every writer that already finished. Never blocks.
    pub fn reap_finished(&self) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        let mut at = 0;
        while at < live.len() {
            if live[at].is_finished() {
                join_writer(live.remove(at));
            } else {
                at += 1;
            }
        }
    }

    /// Joins every outstanding writer. Called once all jobs are done.
    pub fn drain(&self) {
        let writers: Vec<_> = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.drain(..).collect()
        };
        for writer in writers {
            join_writer(writer);
        }
    }

    /// Outstanding (admitted, not yet reaped) snapshot writers.
    pub fn live_snapshots(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn join_writer(writer: JoinHandle<()>) {
    if writer.join().is_err() {
        warn!("a backup writer panicked");
    }
}

/// Dumps one snapshot in SHOW format.
fn write_snapshot(snapshot: &[(String, String)], path: &Path) -> KvResult<()> {
    let mut out = create_truncate(path)?;
    for (key, value) in snapshot {
        writeln!(out, "({key}, {value})")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(n: usize) -> Vec<(String, String)> {
        (0..n).map(|i| (format!("k{i}"), format!("v{i}"))).collect()
    }

    #[test]
    fn snapshot_files_use_show_format() -> KvResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("job-1.bck");

        let coordinator = BackupCoordinator::new(2);
        coordinator.spawn(pairs(2), &path)?;
        coordinator.drain();

        assert_eq!(std::fs::read_to_string(&path)?, "(k0, v0)\n(k1, v1)\n");
        assert_eq!(coordinator.live_snapshots(), 0);
        Ok(())
    }

    #[test]
    fn admission_never_exceeds_the_cap() -> KvResult<()> {
        let dir = tempfile::tempdir()?;
        let coordinator = BackupCoordinator::new(2);

        for n in 1..=6 {
            let path = dir.path().join(format!("job-{n}.bck"));
            coordinator.spawn(pairs(100), &path)?;
            assert!(coordinator.live_snapshots() <= 2);
        }
        coordinator.drain();

        // Every admitted backup produced its file.
        for n in 1..=6 {
            assert!(dir.path().join(format!("job-{n}.bck")).exists());
        }
        Ok(())
    }

    #[test]
    fn reap_finished_does_not_block() -> KvResult<()> {
        let dir = tempfile::tempdir()?;
        let coordinator = BackupCoordinator::new(4);
        coordinator.spawn(pairs(1), &dir.path().join("a-1.bck"))?;

        // Whether or not the writer has finished yet, this returns at once
        // and leaves the counter consistent.
        coordinator.reap_finished();
        assert!(coordinator.live_snapshots() <= 1);
        coordinator.drain();
        assert_eq!(coordinator.live_snapshots(), 0);
        Ok(())
    }
}
