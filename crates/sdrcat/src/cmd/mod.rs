use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod client;
pub mod decode;
pub mod device;
pub mod version;

/// Port the sample device listens on and the console connects to.
pub const DEFAULT_PORT: u16 = 1776;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive console that connects to a device.
    Client(ClientArgs),
    /// Run the sample device.
    Device(DeviceArgs),
    /// Decode captured frames.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Client(args) => client::run(args, format),
        Command::Device(args) => device::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Device host used by `connect` without arguments.
    #[arg(long, env = "SDRCAT_HOST", default_value = "localhost")]
    pub host: String,
    /// Device port used by `connect` without arguments.
    #[arg(long, env = "SDRCAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Connect as soon as the console starts.
    #[arg(long)]
    pub connect: bool,
    /// How long `connect` waits for the link (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Show advisory protocol information.
    #[arg(long)]
    pub info: bool,
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Address to listen on.
    #[arg(long, env = "SDRCAT_HOST", default_value = "localhost")]
    pub host: String,
    /// Port to listen on. 0 picks a free port.
    #[arg(long, env = "SDRCAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Time between unsolicited reports (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub interval: String,
    /// Seed for the report generator.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Show advisory protocol information.
    #[arg(long)]
    pub info: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex digits (whitespace ignored).
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Binary capture file. Without --hex or --file, hex is read from stdin.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Clear `running` on Ctrl-C, then run `on_interrupt`.
pub(crate) fn install_ctrlc_handler(
    running: Arc<AtomicBool>,
    on_interrupt: impl Fn() + Send + 'static,
) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        on_interrupt();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
