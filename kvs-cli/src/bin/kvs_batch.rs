use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use kvs::backup::BackupCoordinator;
use kvs::gate::CommandGate;
use kvs::store::KvTable;
use kvscli::config::BatchSettings;
use kvscli::jobs::JobDispatcher;
use kvscli::trace;

/// Runs every `.job` script in a directory against a fresh store.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Directory containing the `.job` files.
    jobs_dir: PathBuf,

    /// Most snapshot backups allowed to run at once.
    max_backups: usize,

    /// Size of the job worker pool.
    max_threads: usize,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    trace::init_logging(&args.log_level)?;

    let settings = BatchSettings {
        jobs_dir: args.jobs_dir,
        max_backups: args.max_backups,
        max_threads: args.max_threads,
    };
    settings.validate().context("invalid arguments")?;
    info!("kvs-batch starting: {settings:?}");

    let table = KvTable::new();
    let gate = CommandGate::new();
    let backups = BackupCoordinator::new(settings.max_backups);

    let dispatcher = JobDispatcher::new(&settings.jobs_dir, settings.max_threads);
    dispatcher
        .run(&table, &gate, &backups)
        .context("failed to process the jobs directory")?;

    // Snapshot writers admitted by the last jobs may still be running.
    backups.drain();

    info!(
        "kvs-batch done: {}",
        serde_json::to_string(&table.status()).unwrap_or_else(|_| "status unavailable".to_string())
    );
    Ok(())
}
