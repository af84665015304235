//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::config::{Overrides, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "gigelink")]
#[command(
    author,
    version,
    about = "Bring up a link-local GigE camera link and find the camera on it"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, including every tool invocation)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Values that take precedence over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Use this interface instead of auto-selecting one
    #[arg(short, long, env = "GIGELINK_INTERFACE", global = true)]
    pub interface: Option<String>,

    /// Host link-local address
    #[arg(long, env = "GIGELINK_HOST_ADDRESS", global = true)]
    pub host_address: Option<Ipv4Addr>,

    /// Expected camera address (advisory, used in reporting)
    #[arg(long, env = "GIGELINK_CAMERA_ADDRESS", global = true)]
    pub camera_address: Option<Ipv4Addr>,

    /// Target MTU
    #[arg(long, env = "GIGELINK_MTU", global = true)]
    pub mtu: Option<u32>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            interface: args.interface,
            host_address: args.host_address,
            camera_address: args.camera_address,
            mtu: args.mtu,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the camera interface, persist it, and discover the camera (requires root)
    Setup {
        /// Do not ask before configuring an interface that looks wireless
        #[arg(short, long)]
        yes: bool,

        /// Apply to the running system only; write no configuration files
        #[arg(long)]
        no_persist: bool,

        /// Seconds to wait for the camera (default: discovery.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Probe the current configuration and look for the camera (read-only)
    Diagnose {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Seconds to wait for the camera (default: a single pass)
        #[arg(long, default_value = "0")]
        timeout: u64,
    },

    /// List network interfaces and mark the one that would be selected
    Interfaces,

    /// Show version
    Version,
}
