//! One end-to-end setup run.
//!
//! ```text
//! select ──► lock ──► apply ──► persist ──► discover ──► probe
//!   │          │       (continue on error; failures are counted)
//!   │          └─ fatal: lock held, cancelled before apply
//!   └─ fatal: no interface, declined wireless
//! ```

use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::applier::{self, ConfigApplier, RunContext, StepOutcome};
use crate::cmd_abstraction::CommandExecutor;
use crate::config::Config;
use crate::discovery::{CameraIdentity, ChannelReport, DiscoveryScanner};
use crate::error::SetupError;
use crate::fs_abstraction::FileSystem;
use crate::interfaces::{InterfaceSelector, NetworkInterface};
use crate::lock::LockGuard;
use crate::persistence::{PersistReport, PersistenceWriter};
use crate::probe::{ConfigProbe, TunableCheck};
use crate::signal::ShutdownToken;

#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Write the on-disk artifacts after applying
    pub persist: bool,
    pub discovery_timeout: Duration,
}

/// Everything one run produced, in the order it happened.
#[derive(Debug, Clone, Serialize)]
pub struct SetupResult {
    pub interface: NetworkInterface,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistReport>,
    pub camera: Option<CameraIdentity>,
    pub channels: Vec<ChannelReport>,
    /// Post-apply probe
    pub checks: Vec<TunableCheck>,
    /// Configured camera address; advisory only
    pub expected_camera_address: Ipv4Addr,
    pub daemon_stopped: bool,
    pub error_count: usize,
}

impl SetupResult {
    /// A note when the camera answered somewhere other than the configured
    /// address. Never counted as an error.
    pub fn camera_address_note(&self) -> Option<String> {
        let camera = self.camera.as_ref()?;
        match camera.ip {
            Some(ip) if ip != self.expected_camera_address => Some(format!(
                "camera {} answered at {}, not the configured {}; update camera_address or the camera's persistent IP",
                camera.mac, ip, self.expected_camera_address
            )),
            None => Some(format!(
                "camera {} has no IPv4 address yet; it may still be booting",
                camera.mac
            )),
            _ => None,
        }
    }
}

pub struct SetupOrchestrator<'a> {
    cmd: Arc<dyn CommandExecutor>,
    fs: &'a dyn FileSystem,
    config: &'a Config,
}

impl<'a> SetupOrchestrator<'a> {
    pub fn new(cmd: Arc<dyn CommandExecutor>, fs: &'a dyn FileSystem, config: &'a Config) -> Self {
        Self { cmd, fs, config }
    }

    /// Pick the interface to configure. `confirm` is asked before accepting
    /// one that looks wireless.
    pub fn select(
        &self,
        confirm: &dyn Fn(&NetworkInterface) -> bool,
    ) -> Result<NetworkInterface, SetupError> {
        let config = self.config;
        let iface = InterfaceSelector::new(
            self.cmd.as_ref(),
            self.fs,
            &config.preferred_interfaces,
            config.interface.as_deref(),
        )
        .select()?;
        if iface.is_wireless() && !confirm(&iface) {
            return Err(SetupError::WirelessDeclined(iface.name));
        }
        Ok(iface)
    }

    /// Configure `iface`. Only locking, or a cancellation that arrives
    /// before the first change, can fail the run; everything after is
    /// folded into [`SetupResult::error_count`].
    ///
    /// A cancellation during apply skips the remaining steps and
    /// persistence, and cuts discovery short.
    pub async fn run(
        &self,
        iface: NetworkInterface,
        options: &SetupOptions,
        token: &ShutdownToken,
    ) -> Result<SetupResult, SetupError> {
        let config = self.config;
        let targets = config
            .targets()
            .map_err(|e| SetupError::Config(e.to_string()))?;
        let prefixes = config
            .vendor_prefixes()
            .map_err(|e| SetupError::Config(e.to_string()))?;

        let _lock = LockGuard::acquire(&config.paths.lock_dir, &iface.name)?;
        if token.is_cancelled() {
            return Err(SetupError::Cancelled);
        }
        info!("Configuring {} for link-local camera traffic", iface.name);

        let writer = PersistenceWriter::new(self.fs, &config.paths);
        let mut ctx = RunContext::new(&iface.name, targets);

        let steps = ConfigApplier::new(self.cmd.as_ref(), &writer)
            .cancellable(token)
            .apply(&mut ctx);
        let mut error_count = applier::error_count(&steps);

        let persistence = if token.is_cancelled() {
            warn!("Interrupted, session changes were not persisted");
            None
        } else if options.persist {
            let report = writer.persist(&ctx.iface, &ctx.targets, ctx.ring_max);
            error_count += report.error_count();
            Some(report)
        } else {
            info!("Skipping persistence (--no-persist)");
            None
        };

        let scanner = DiscoveryScanner::standard(
            Arc::clone(&self.cmd),
            config.discovery.sweep_range,
            config.discovery.vendor_tool.as_ref(),
            prefixes,
            config.poll_interval(),
        );
        info!(
            "Waiting up to {}s for the camera on {}",
            options.discovery_timeout.as_secs(),
            ctx.iface
        );
        let discovery = scanner
            .discover(&ctx.iface, options.discovery_timeout, token)
            .await;
        if !discovery.found() {
            warn!("No camera found on {}", ctx.iface);
            error_count += 1;
        }

        let checks = ConfigProbe::new(
            self.cmd.as_ref(),
            self.fs,
            &ctx.targets,
            &config.paths.network_manager_conf,
        )
        .probe(&ctx.iface);

        Ok(SetupResult {
            interface: iface,
            steps,
            persistence,
            camera: discovery.camera,
            channels: discovery.channels,
            checks,
            expected_camera_address: config.camera_address,
            daemon_stopped: ctx.daemon_stopped,
            error_count,
        })
    }
}
