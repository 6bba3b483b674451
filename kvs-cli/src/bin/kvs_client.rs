use std::io::{stdin, BufRead};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;

use kvscli::client::api::ClientSession;
use kvscli::client::{parse_client_line, usage, ClientCommand};
use kvscli::config::ClientSettings;
use kvscli::trace;

/// Interactive session client: subscribes to keys and prints the
/// notifications the server pushes for them.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Unique id; the session pipes are created as `/tmp/{req,resp,notif}<id>`.
    client_id: String,

    /// Name of the server's registration FIFO under `/tmp`.
    fifo_name: String,

    #[clap(short = 'l', long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    trace::init_logging(&args.log_level)?;

    let settings = ClientSettings { client_id: args.client_id, fifo_name: args.fifo_name };
    settings.validate().context("invalid arguments")?;

    let mut session =
        ClientSession::connect(&settings).context("failed to connect to the server")?;

    for line in stdin().lock().lines() {
        let line = line.context("failed to read a command")?;
        let Some(command) = parse_client_line(&line) else {
            continue;
        };

        match command {
            ClientCommand::Subscribe(key) => match session.subscribe(&key) {
                Ok(true) => {}
                Ok(false) => warn!("Command subscribe failed"),
                Err(err) => {
                    warn!("Command subscribe failed: {err}");
                    if session.server_gone() {
                        break;
                    }
                }
            },
            ClientCommand::Unsubscribe(key) => match session.unsubscribe(&key) {
                Ok(true) => {}
                Ok(false) => warn!("Command unsubscribe failed"),
                Err(err) => {
                    warn!("Command unsubscribe failed: {err}");
                    if session.server_gone() {
                        break;
                    }
                }
            },
            ClientCommand::Delay(delay_ms) => {
                if delay_ms > 0 {
                    println!("Waiting...");
                    thread::sleep(Duration::from_millis(delay_ms));
                }
            }
            ClientCommand::Disconnect => break,
            ClientCommand::Invalid(reason) => {
                warn!("Invalid command ({reason})");
                eprint!("{}", usage());
            }
        }
    }

    // End of input behaves like DISCONNECT, as it always has.
    session.disconnect().context("failed to disconnect")?;
    println!("Disconnected from server");
    Ok(())
}
