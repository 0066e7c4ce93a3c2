use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod dump;
pub mod ingest;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a framed log stream from a FIFO and print each message.
    Ingest(IngestArgs),
    /// Write lines from stdin or a file as frames.
    Send(SendArgs),
    /// Decode frames from a file or FIFO and print them.
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ingest(args) => ingest::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// FIFO to read frames from.
    pub path: PathBuf,
    /// Producer identity used for read-back lookups.
    #[arg(long)]
    pub id: String,
    /// Producer display name.
    #[arg(long)]
    pub name: Option<String>,
    /// Log path for the stream. Default: <LOG_ROOT>/<ID>.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,
    /// Parent directory of derived log paths.
    #[arg(long, value_name = "DIR", env = "LOGMUX_LOG_ROOT")]
    pub log_root: Option<PathBuf>,
    /// Create the FIFO if it does not exist.
    #[arg(long)]
    pub create: bool,
    /// POST each message to this URL as {"text": "<message json>"}.
    /// Falls back to WEBHOOK_URL when neither the flag nor LOGMUX_WEBHOOK_URL is set.
    #[arg(long, value_name = "URL", env = "LOGMUX_WEBHOOK_URL")]
    pub webhook_url: Option<String>,
    /// Largest accepted frame payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// FIFO or file to write frames to.
    pub path: PathBuf,
    /// Source label attached to every frame.
    #[arg(long, default_value = "stdout")]
    pub source: String,
    /// Read lines from a file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// FIFO or file to read frames from.
    pub path: PathBuf,
    /// Label printed as the producer of each message.
    #[arg(long, default_value = "-")]
    pub id: String,
    /// Largest accepted frame payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
