use std::path::PathBuf;

use clap::{Args, Subcommand};
use plexwire_mux::SessionConfig;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod echo;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a socket and echo every channel's data back to the peer.
    Echo(EchoArgs),
    /// Open one channel, send a payload and end it.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, session: &SessionArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, session.load()?).await,
        Command::Send(args) => send::run(args, session.load()?, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Session options shared by every connecting command.
#[derive(Args, Debug, Default)]
pub struct SessionArgs {
    /// Session config file (JSON). Flags below override its values.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    /// Maximum accepted frame payload, in bytes (0 disables the check).
    #[arg(long, value_name = "BYTES", global = true)]
    pub limit: Option<usize>,
    /// Deliver channel data incrementally instead of per frame.
    #[arg(long, global = true)]
    pub chunked: bool,
    /// Exchange channel names as raw bytes.
    #[arg(long, global = true)]
    pub binary_name: bool,
}

impl SessionArgs {
    pub fn load(&self) -> CliResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|err| {
                    io_error(&format!("failed reading {}", path.display()), err)
                })?;
                serde_json::from_str(&text).map_err(|err| {
                    CliError::new(
                        DATA_INVALID,
                        format!("invalid session config {}: {err}", path.display()),
                    )
                })?
            }
            None => SessionConfig::default(),
        };

        if self.limit.is_some() {
            config.limit = self.limit;
        }
        config.chunked |= self.chunked;
        config.binary_name |= self.binary_name;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channel name announced to the peer. Default: the channel id.
    #[arg(long, short = 'n')]
    pub name: Option<String>,
    /// JSON payload: a string, or an array of byte values.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for the peer to end the channel and print what it sent.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
