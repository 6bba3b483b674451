use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use signal_hook::consts::SIGUSR1;

use kvscli::config::ServerSettings;
use kvscli::jobs::JobDispatcher;
use kvscli::server::registration::RegistrationEndpoint;
use kvscli::server::ServerContext;
use kvscli::trace;

/// Serves pipe sessions with key-change notifications while also running
/// the `.job` scripts found in the directory.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Directory containing the `.job` files.
    jobs_dir: PathBuf,

    /// Size of the job worker pool.
    max_threads: usize,

    /// Most snapshot backups allowed to run at once.
    max_backups: usize,

    /// Name of the registration FIFO, created as `/tmp/<name>`.
    fifo_name: String,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    trace::init_logging(&args.log_level)?;

    let settings = ServerSettings {
        jobs_dir: args.jobs_dir,
        max_threads: args.max_threads,
        max_backups: args.max_backups,
        fifo_name: args.fifo_name,
    };
    settings.validate().context("invalid arguments")?;
    info!("kvs-server starting: {settings:?}");

    let context = ServerContext::new(settings.max_backups)
        .context("failed to initialize the server state")?;

    // SIGUSR1 only raises the flag; the registration thread does the work.
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGUSR1, shutdown.clone())
        .context("failed to install the SIGUSR1 handler")?;

    let endpoint = RegistrationEndpoint::new(
        &settings.registration_path(),
        context.pool.clone(),
        shutdown,
    );
    endpoint
        .create_fifo()
        .context("failed to create the registration FIFO")?;

    let dispatcher = JobDispatcher::new(&settings.jobs_dir, settings.max_threads);
    let outcome = thread::scope(|scope| {
        scope.spawn(|| {
            if let Err(err) = dispatcher.run(&context.table, &context.gate, &context.backups) {
                error!("failed to process the jobs directory: {err}");
                return;
            }
            context.backups.drain();
            info!(
                "jobs done: {}",
                serde_json::to_string(&context.table.status())
                    .unwrap_or_else(|_| "status unavailable".to_string())
            );
        });

        // Serves registrations for the lifetime of the process.
        endpoint.run()
    });

    outcome.context("registration endpoint failed")?;
    Ok(())
}
