//! The command stream a `.job` file compiles to, and the executor that
//! drives it against the store.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::backup::BackupCoordinator;
use crate::error::KvResult;
use crate::gate::CommandGate;
use crate::store::KvTable;

/// Most pairs a single WRITE may carry.
pub const MAX_WRITE_PAIRS: usize = 256;

/// Placeholder value emitted when READ misses.
pub const READ_MISS: &str = "KVSERROR";

/// Placeholder value emitted when DELETE misses.
pub const DELETE_MISS: &str = "KVSMISSING";

/// Usage text for HELP and parse diagnostics.
pub const HELP_TEXT: &str = "Available commands:\n  \
     WRITE [(key,value)(key2,value2),...]\n  \
     READ [key,key2,...]\n  \
     DELETE [key,key2,...]\n  \
     SHOW\n  \
     WAIT <delay_ms>\n  \
     BACKUP\n  \
     HELP\n";

/// One parsed script command. Produced by the `.job` tokenizer in the CLI
/// crate; the executor only sees this stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Store every pair, in order.
    Write(Vec<(String, String)>),
    /// Look up every key; output is sorted by key.
    Read(Vec<String>),
    /// Remove every key, in order; misses are reported.
    Delete(Vec<String>),
    /// Dump the whole store.
    Show,
    /// Sleep the worker for the given milliseconds.
    Wait(u64),
    /// Snapshot the store to the job's next `.bck` file.
    Backup,
    /// Print usage.
    Help,
    /// A line that failed to parse; the reason is diagnostic only.
    Invalid(String),
}

/// Executes one job's command stream.
///
/// One executor per `.job` file; many run concurrently, coordinated by the
/// [`CommandGate`]: WRITE and DELETE enter as writers, READ, SHOW and
/// BACKUP as readers, WAIT and diagnostics bypass the gate. Output goes to
/// the job's `.out` sink; backups go to `<stem>-<n>.bck`, `n` counting from
/// 1 within the job.
pub struct Executor<'a> {
    table: &'a KvTable,
    gate: &'a CommandGate,
    backups: &'a BackupCoordinator,
    backup_stem: PathBuf,
}

impl<'a> Executor<'a> {
    /// `backup_stem` is the job path with the `.job` extension removed.
    pub fn new(
        table: &'a KvTable,
        gate: &'a CommandGate,
        backups: &'a BackupCoordinator,
        backup_stem: &Path,
    ) -> Self {
        Executor { table, gate, backups, backup_stem: backup_stem.to_path_buf() }
    }

    /// Runs the stream to completion. Only sink failures abort a job;
    /// storage misses and invalid commands are per-command events.
    pub fn run<I>(&self, commands: I, out: &mut dyn Write) -> KvResult<()>
    where
        I: IntoIterator<Item = Command>,
    {
        let mut backups_done = 0usize;
        for command in commands {
            match command {
                Command::Write(pairs) => {
                    let _pass = self.gate.write_pass();
                    for (key, value) in &pairs {
                        if let Err(err) = self.table.put(key, value) {
                            warn!("Failed to write keypair ({key},{value}): {err}");
                        }
                    }
                }
                Command::Read(mut keys) => {
                    let _pass = self.gate.read_pass();
                    keys.sort();
                    out.write_all(b"[")?;
                    for key in &keys {
                        match self.table.get(key) {
                            Some(value) => write!(out, "({key},{value})")?,
                            None => write!(out, "({key},{READ_MISS})")?,
                        }
                    }
                    out.write_all(b"]\n")?;
                }
                Command::Delete(keys) => {
                    let _pass = self.gate.write_pass();
                    let mut missing = Vec::new();
                    for key in keys {
                        if !self.table.delete(&key) {
                            missing.push(key);
                        }
                    }
                    if !missing.is_empty() {
                        out.write_all(b"[")?;
                        for key in &missing {
                            write!(out, "({key},{DELETE_MISS})")?;
                        }
                        out.write_all(b"]\n")?;
                    }
                }
                Command::Show => {
                    let _pass = self.gate.read_pass();
                    self.table.snapshot_to(out)?;
                }
                Command::Wait(delay_ms) => {
                    if delay_ms > 0 {
                        out.write_all(b"Waiting...\n")?;
                        thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
                Command::Backup => {
                    let pass = self.gate.read_pass();
                    // The deep copy is consistent: writers are gated out.
                    let snapshot = self.table.snapshot();
                    let target = self.backup_path(backups_done + 1);
                    match self.backups.spawn(snapshot, &target) {
                        Ok(()) => backups_done += 1,
                        Err(err) => warn!("Failed to perform backup: {err}"),
                    }
                    drop(pass);
                    self.backups.reap_finished();
                }
                Command::Help => {
                    info!("{HELP_TEXT}");
                }
                Command::Invalid(reason) => {
                    warn!("Invalid command. See HELP for usage");
                    log::debug!("rejected line: {reason}");
                }
            }
        }
        Ok(())
    }

    fn backup_path(&self, sequence: usize) -> PathBuf {
        let mut name = self.backup_stem.as_os_str().to_os_string();
        name.push(format!("-{sequence}.bck"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Fixture {
        table: KvTable,
        gate: CommandGate,
        backups: BackupCoordinator,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                table: KvTable::new(),
                gate: CommandGate::new(),
                backups: BackupCoordinator::new(2),
                dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn run(&self, commands: Vec<Command>) -> String {
            let stem = self.dir.path().join("job");
            let executor = Executor::new(&self.table, &self.gate, &self.backups, &stem);
            let mut out = Vec::new();
            executor.run(commands, &mut out).expect("job runs");
            self.backups.drain();
            String::from_utf8(out).expect("output is utf-8")
        }

        fn pair(key: &str, value: &str) -> (String, String) {
            (key.to_string(), value.to_string())
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn read_output_is_sorted_by_key() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("a", "1"), Fixture::pair("b", "2")]),
            Command::Read(keys(&["b", "a"])),
        ]);
        assert_eq!(out, "[(a,1)(b,2)]\n");
    }

    #[test]
    fn read_misses_are_marked_in_place() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("b", "2")]),
            Command::Read(keys(&["c", "b", "a"])),
        ]);
        assert_eq!(out, "[(a,KVSERROR)(b,2)(c,KVSERROR)]\n");
    }

    #[test]
    fn delete_reports_misses_in_input_order() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("x", "1")]),
            Command::Delete(keys(&["x", "y"])),
            Command::Read(keys(&["x"])),
        ]);
        assert_eq!(out, "[(y,KVSMISSING)]\n[(x,KVSERROR)]\n");
    }

    #[test]
    fn delete_with_no_misses_is_silent() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("x", "1")]),
            Command::Delete(keys(&["x"])),
        ]);
        assert_eq!(out, "");
    }

    #[test]
    fn last_write_wins() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("k", "v1")]),
            Command::Write(vec![Fixture::pair("k", "v2")]),
            Command::Read(keys(&["k"])),
        ]);
        assert_eq!(out, "[(k,v2)]\n");
    }

    #[test]
    fn show_uses_the_spaced_format() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Write(vec![Fixture::pair("k", "v")]),
            Command::Show,
        ]);
        assert_eq!(out, "(k, v)\n");
    }

    #[test]
    fn wait_announces_only_nonzero_delays() {
        let fx = Fixture::new();
        let out = fx.run(vec![Command::Wait(0), Command::Wait(5)]);
        assert_eq!(out, "Waiting...\n");
    }

    #[test]
    fn backups_number_from_one_per_job() {
        let fx = Fixture::new();
        fx.run(vec![
            Command::Write(vec![Fixture::pair("k", "v")]),
            Command::Backup,
            Command::Write(vec![Fixture::pair("k", "w")]),
            Command::Backup,
        ]);

        let first = fx.dir.path().join("job-1.bck");
        let second = fx.dir.path().join("job-2.bck");
        assert_eq!(std::fs::read_to_string(first).unwrap(), "(k, v)\n");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "(k, w)\n");
    }

    #[test]
    fn diagnostics_produce_no_job_output() {
        let fx = Fixture::new();
        let out = fx.run(vec![
            Command::Help,
            Command::Invalid("FROB".to_string()),
            Command::Read(keys(&["missing"])),
        ]);
        assert_eq!(out, "[(missing,KVSERROR)]\n");
    }
}
