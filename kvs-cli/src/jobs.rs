//! `.job` discovery and the bounded worker pool that drains it.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;

use log::{debug, warn};

use kvs::backup::BackupCoordinator;
use kvs::error::KvResult;
use kvs::gate::CommandGate;
use kvs::io::create_truncate;
use kvs::script::Executor;
use kvs::store::KvTable;

use crate::ast::parser::parse_line;

pub const JOB_EXTENSION: &str = "job";
pub const OUT_EXTENSION: &str = "out";

/// Runs every `.job` file in a directory through a fixed pool of workers.
///
/// The directory iterator itself is the shared work queue: each worker takes
/// the next entry under a mutex, releases it, and processes the file, so
/// jobs start in directory order but run concurrently up to `max_threads`.
pub struct JobDispatcher {
    jobs_dir: PathBuf,
    max_threads: usize,
}

impl JobDispatcher {
    pub fn new(jobs_dir: &Path, max_threads: usize) -> Self {
        JobDispatcher { jobs_dir: jobs_dir.to_path_buf(), max_threads: max_threads.max(1) }
    }

    /// Drains the directory; returns once every job has finished. Fails
    /// only when the directory cannot be read at all.
    pub fn run(
        &self,
        table: &KvTable,
        gate: &CommandGate,
        backups: &BackupCoordinator,
    ) -> KvResult<()> {
        let entries = Mutex::new(fs::read_dir(&self.jobs_dir)?);

        thread::scope(|scope| {
            for _ in 0..self.max_threads {
                scope.spawn(|| loop {
                    let next = {
                        let mut entries =
                            entries.lock().unwrap_or_else(PoisonError::into_inner);
                        entries.next()
                    };
                    match next {
                        Some(Ok(entry)) => {
                            let path = entry.path();
                            if !is_job_file(&path) {
                                continue;
                            }
                            debug!("running job {}", path.display());
                            if let Err(err) = run_job(&path, table, gate, backups) {
                                warn!("job {} failed: {err}", path.display());
                            }
                        }
                        Some(Err(err)) => warn!("failed to read a jobs directory entry: {err}"),
                        None => break,
                    }
                });
            }
        });

        Ok(())
    }
}

fn is_job_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == JOB_EXTENSION)
}

/// Executes one `.job` file, writing results to the sibling `.out` file.
/// Backups land next to the job as `<stem>-<n>.bck`.
pub fn run_job(
    path: &Path,
    table: &KvTable,
    gate: &CommandGate,
    backups: &BackupCoordinator,
) -> KvResult<()> {
    let source = fs::read_to_string(path)?;
    let mut out = BufWriter::new(create_truncate(&path.with_extension(OUT_EXTENSION))?);
    let stem = path.with_extension("");

    let executor = Executor::new(table, gate, backups, &stem);
    executor.run(source.lines().filter_map(parse_line), &mut out)?;
    out.flush()?;
    Ok(())
}
