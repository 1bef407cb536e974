use std::path::PathBuf;

use clap::{Args, Subcommand};
use peerlane::codec::{DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION};

use crate::exit::{CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod config;
pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a frame and print its header.
    Decode(DecodeArgs),
    /// Encode an envelope into a frame.
    Encode(EncodeArgs),
    /// Validate settings and print the effective configuration.
    Config(ConfigArgs),
    /// Run two in-process systems and report compression per round.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Config(args) => config::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame as hex. Reads raw bytes from stdin when neither --hex nor
    /// --file is given.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read the raw frame from a file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// Highest protocol version to accept.
    #[arg(long, default_value_t = PROTOCOL_VERSION)]
    pub highest_version: u8,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Unique id of the sending system.
    #[arg(long, default_value_t = 1)]
    pub origin_uid: u64,
    /// Serializer id of the payload.
    #[arg(long, default_value_t = 1)]
    pub serializer_id: i32,
    /// Recipient actor path.
    #[arg(long)]
    pub recipient: Option<String>,
    /// Sender actor path.
    #[arg(long)]
    pub sender: Option<String>,
    /// Type manifest of the payload.
    #[arg(long, default_value = "")]
    pub manifest: String,
    /// Text payload.
    #[arg(long, conflicts_with = "hex_payload")]
    pub data: Option<String>,
    /// Payload as hex.
    #[arg(long, conflicts_with = "data")]
    pub hex_payload: Option<String>,
    /// Metadata entry as ID=TEXT (repeatable).
    #[arg(long, value_name = "ID=TEXT")]
    pub metadata: Vec<String>,
    /// Protocol version written to the header.
    #[arg(long, default_value_t = PROTOCOL_VERSION)]
    pub protocol_version: u8,
    /// Actor paths the peer has advertised (comma-separated, rank order).
    #[arg(long, value_delimiter = ',')]
    pub actor_refs: Vec<String>,
    /// Manifests the peer has advertised (comma-separated, rank order).
    #[arg(long, value_delimiter = ',')]
    pub manifests: Vec<String>,
    /// Version of the advertised tables.
    #[arg(long, default_value_t = 1)]
    pub table_version: u8,
    /// Maximum frame size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Settings file (JSON). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "PEERLANE_CONFIG")]
    pub file: Option<PathBuf>,
    /// Only validate; print nothing but the verdict.
    #[arg(long)]
    pub check: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Settings file (JSON) used for both systems.
    #[arg(long, short = 'c', env = "PEERLANE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Number of rounds; each ends with an advertisement tick.
    #[arg(long, default_value_t = 3)]
    pub rounds: usize,
    /// Messages sent per round.
    #[arg(long, default_value_t = 100)]
    pub messages: usize,
    /// Recipient paths, used round-robin (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "/user/a,/user/b")]
    pub recipients: Vec<String>,
    /// Manifest of every message.
    #[arg(long, default_value = "Greeting")]
    pub manifest: String,
    /// Overrides compression.hit-sample-interval (power of two).
    #[arg(long)]
    pub sample_interval: Option<u32>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex input, ignoring whitespace.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}
