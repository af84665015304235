//! Read-only diagnostic run: select, probe, discover.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::output::{DiagnosticReport, SystemInfo};
use crate::cmd_abstraction::CommandExecutor;
use crate::config::Config;
use crate::discovery::DiscoveryScanner;
use crate::error::SetupError;
use crate::fs_abstraction::FileSystem;
use crate::interfaces::InterfaceSelector;
use crate::probe::ConfigProbe;
use crate::signal::ShutdownToken;
use crate::tools::{ethtool, firewall, ip, network_manager, scan, sysctl};

/// Builds a [`DiagnosticReport`] without changing anything on the host.
pub struct DiagnosticReporter<'a> {
    cmd: Arc<dyn CommandExecutor>,
    fs: &'a dyn FileSystem,
    config: &'a Config,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(cmd: Arc<dyn CommandExecutor>, fs: &'a dyn FileSystem, config: &'a Config) -> Self {
        Self { cmd, fs, config }
    }

    /// Only interface selection can fail; every other problem shows up as
    /// a check or channel result in the report.
    pub async fn run(
        &self,
        timeout: Duration,
        token: &ShutdownToken,
    ) -> Result<DiagnosticReport, SetupError> {
        let start = Instant::now();
        let config = self.config;
        let targets = config
            .targets()
            .map_err(|e| SetupError::Config(e.to_string()))?;
        let prefixes = config
            .vendor_prefixes()
            .map_err(|e| SetupError::Config(e.to_string()))?;

        let iface = InterfaceSelector::new(
            self.cmd.as_ref(),
            self.fs,
            &config.preferred_interfaces,
            config.interface.as_deref(),
        )
        .select()?;
        info!("Diagnosing {}", iface.name);

        let checks = ConfigProbe::new(
            self.cmd.as_ref(),
            self.fs,
            &targets,
            &config.paths.network_manager_conf,
        )
        .probe(&iface.name);
        debug!("{} checks evaluated", checks.len());

        let discovery = DiscoveryScanner::standard(
            Arc::clone(&self.cmd),
            config.discovery.sweep_range,
            config.discovery.vendor_tool.as_ref(),
            prefixes,
            config.poll_interval(),
        )
        .discover(&iface.name, timeout, token)
        .await;

        let mut tools = vec![
            ip::IP,
            ethtool::ETHTOOL,
            sysctl::SYSCTL,
            firewall::UFW,
            network_manager::NMCLI,
            network_manager::SYSTEMCTL,
            scan::ARP_SCAN,
        ];
        if let Some(vendor) = &config.discovery.vendor_tool {
            tools.push(vendor.program.as_str());
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        Ok(DiagnosticReport::new(
            iface,
            checks,
            discovery,
            config.camera_address,
            duration_ms,
        )
        .with_system_info(SystemInfo::collect(self.cmd.as_ref(), self.fs, &tools)))
    }
}
