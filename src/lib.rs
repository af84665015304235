//! # gigelink - GigE camera link bring-up for Linux hosts
//!
//! Configures a dedicated Ethernet interface for a GigE Vision camera on the
//! IPv4 link-local segment, persists the configuration across reboots, and
//! then waits for the camera to show up on the wire.
//!
//! ## Features
//!
//! - **Interface Selection** - Config override, preferred names, then the first wired NIC
//! - **Idempotent Apply** - Every tunable is read before it is written
//! - **Persistence** - Interface stanza, sysctl lines, rp_filter and NetworkManager exemptions
//! - **Camera Discovery** - Neighbor table, active sweep and an optional vendor tool
//! - **Diagnostics** - Read-only probe with an exact remediation for every gap
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        gigelink                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: setup, diagnose, interfaces, version       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml) + CLI/env overrides                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SetupOrchestrator                                          │
//! │    ├── InterfaceSelector                                    │
//! │    ├── ConfigApplier ──► PersistenceWriter                  │
//! │    ├── DiscoveryScanner (neighbor, sweep, vendor tool)      │
//! │    └── ConfigProbe                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tool adapters: ip, ethtool, sysctl, ufw, nmcli, arp-scan   │
//! │    └── CommandExecutor / FileSystem traits (mockable)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use gigelink::cmd_abstraction::RealCommandExecutor;
//! use gigelink::config::Config;
//! use gigelink::fs_abstraction::real_fs;
//! use gigelink::orchestrator::{SetupOptions, SetupOrchestrator};
//! use gigelink::signal::ShutdownToken;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     gigelink::utils::check_root()?;
//!     let config = Config::load_or_default("/etc/gigelink/config.yaml")?;
//!
//!     let cmd = Arc::new(RealCommandExecutor::new());
//!     let options = SetupOptions {
//!         persist: true,
//!         discovery_timeout: config.discovery_timeout(),
//!     };
//!     let orchestrator = SetupOrchestrator::new(cmd, real_fs(), &config);
//!     let iface = orchestrator.select(&|_| false)?;
//!     let result = orchestrator
//!         .run(iface, &options, &ShutdownToken::new())
//!         .await?;
//!
//!     println!("{} error(s)", result.error_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`applier`] - Ordered, idempotent mutation steps
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing, overrides and validation
//! - [`discovery`] - Camera discovery channels and the polling loop
//! - [`interfaces`] - Interface enumeration and selection
//! - [`lock`] - Per-interface run lock
//! - [`persistence`] - Reboot-surviving configuration files
//! - [`probe`] - Read-only checks of every tunable
//! - [`signal`] - Cancellation on SIGINT/SIGTERM
//! - [`tools`] - Adapters for the external tools

pub mod applier;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fs_abstraction;
pub mod interfaces;
pub mod lock;
pub mod mac;
pub mod orchestrator;
pub mod persistence;
pub mod probe;
pub mod signal;
pub mod tools;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{SetupError, ToolError};
