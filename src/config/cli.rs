use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::ModelChoice;
use crate::replay::Pacing;

#[derive(Parser)]
#[command(name = "uhid-replay")]
#[command(about = "Replay a captured HID device through /dev/uhid")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Capture file to replay
    pub capture: Option<PathBuf>,

    /// uhid character device
    #[arg(long, env = "UHID_REPLAY_GATEWAY")]
    pub gateway: Option<PathBuf>,

    /// Controller model to emulate (auto, ds3, ds4, switch-pro, generic)
    #[arg(long, value_parser = clap::value_parser!(ModelChoice))]
    pub model: Option<ModelChoice>,

    /// Unique id (MAC address) presented to the kernel
    #[arg(long)]
    pub uniq: Option<String>,

    /// Give up if the driver handshake takes longer than this
    #[arg(long)]
    pub handshake_timeout_ms: Option<u64>,

    /// Quiet time after the last report before destroying the device
    #[arg(long)]
    pub linger_ms: Option<u64>,

    /// Report pacing (immediate, recorded)
    #[arg(long, value_parser = clap::value_parser!(Pacing))]
    pub pacing: Option<Pacing>,

    /// Fail on frames with unknown event tags
    #[arg(long)]
    pub strict: bool,

    /// Path to config file
    #[arg(long, env = "UHID_REPLAY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a parsed capture without touching the gateway
    Dump {
        /// Capture file to parse
        capture: PathBuf,
    },
}
