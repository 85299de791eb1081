use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for RttCom
#[derive(Parser, Debug)]
#[command(
    name = "rttcom",
    version = env!("CARGO_PKG_VERSION"),
    about = "RTT communication tool for embedded targets behind a debug probe",
    long_about = "Starts an RTT session through a debug probe, lists the target's channels and reads from or writes to them. Without a hardware driver the configured simulated target is used."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a session and list the discovered channels
    Channels(ProbeArgs),
    /// Read once from an up channel
    Read(ReadArgs),
    /// Write to a down channel
    Write(WriteArgs),
    /// Stream an up channel until interrupted
    Monitor(MonitorArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
    /// CSV output
    Csv,
}

/// Probe selection and start options shared by the session commands
#[derive(ClapArgs, Debug, Clone)]
pub struct ProbeArgs {
    /// Probe serial number
    #[arg(short, long, conflicts_with = "profile")]
    pub serial: Option<u32>,

    /// Probe profile name from the configuration
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Do not reset the target before connecting
    #[arg(long)]
    pub no_reset: bool,

    /// Override the control block discovery bound
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Override the delay between discovery polls, in microseconds
    #[arg(long)]
    pub poll_interval_us: Option<u64>,
}

/// Read arguments
#[derive(ClapArgs, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Up channel index
    #[arg(long)]
    pub channel: Option<u32>,

    /// Maximum number of bytes to read
    #[arg(short, long)]
    pub max: Option<u32>,

    /// Data format (hex, text, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,
}

/// Write arguments
#[derive(ClapArgs, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Data to send
    pub data: String,

    /// Down channel index
    #[arg(long)]
    pub channel: Option<u32>,

    /// Data format (hex, text, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,
}

/// Monitor arguments
#[derive(ClapArgs, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Up channel index
    #[arg(long)]
    pub channel: Option<u32>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Data format (hex, text, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,

    /// Report throughput once per second
    #[arg(short, long)]
    pub throughput: bool,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Create default configuration
    Init {
        /// Project directory to initialize
        #[arg(long)]
        dir: Option<String>,
        /// Global configuration
        #[arg(short, long)]
        global: bool,
    },
    /// Print the configuration file locations
    Path,
}

/// Data format argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Text,
    Hex,
    Base64,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Text => write!(f, "text"),
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}
