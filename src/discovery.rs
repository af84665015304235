//! Locate the camera by vendor MAC prefix.
//!
//! Three independent channels are consulted on every pass: the kernel
//! neighbor table, an active `arp-scan` sweep and the vendor's discovery
//! tool. None is short-circuited, so the report shows which paths can see
//! the camera. The channels of a pass run side by side on blocking threads
//! and are cut off at the discovery deadline plus one poll interval, so a
//! hung tool cannot stall the run. Passes repeat every poll interval until a camera appears,
//! the timeout elapses, or the shutdown token is cancelled.

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cmd_abstraction::CommandExecutor;
use crate::config::VendorToolConfig;
use crate::error::ToolError;
use crate::mac::{MacAddr, VendorPrefix};
use crate::signal::ShutdownToken;
use crate::tools::ip::IpTool;
use crate::tools::scan::{ArpScan, ScannedDevice, VendorTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    NeighborTable,
    ActiveSweep,
    VendorTool,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMethod::NeighborTable => write!(f, "neighbor table"),
            DiscoveryMethod::ActiveSweep => write!(f, "active sweep"),
            DiscoveryMethod::VendorTool => write!(f, "vendor tool"),
        }
    }
}

/// A camera seen on the segment during this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraIdentity {
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub method: DiscoveryMethod,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChannelStatus {
    Found { mac: MacAddr, ip: Option<Ipv4Addr> },
    NotFound,
    Unavailable { detail: String },
    Error { detail: String },
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Found { mac, ip: Some(ip) } => write!(f, "found {} at {}", mac, ip),
            ChannelStatus::Found { mac, ip: None } => write!(f, "found {} (no address)", mac),
            ChannelStatus::NotFound => write!(f, "no camera"),
            ChannelStatus::Unavailable { detail } => write!(f, "unavailable ({})", detail),
            ChannelStatus::Error { detail } => write!(f, "error ({})", detail),
        }
    }
}

/// The last result of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub method: DiscoveryMethod,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub camera: Option<CameraIdentity>,
    pub channels: Vec<ChannelReport>,
    pub passes: u32,
    pub cancelled: bool,
}

impl DiscoveryOutcome {
    pub fn found(&self) -> bool {
        self.camera.is_some()
    }
}

/// One way of listing devices on the segment.
///
/// `scan` runs on a blocking thread and may be abandoned when it outlives
/// the pass deadline, so implementations own everything they touch.
pub trait DiscoveryChannel: Send + Sync + 'static {
    fn method(&self) -> DiscoveryMethod;

    fn scan(&self, iface: &str) -> Result<Vec<ScannedDevice>, ToolError>;
}

pub struct NeighborTableChannel {
    cmd: Arc<dyn CommandExecutor>,
}

impl NeighborTableChannel {
    pub fn new(cmd: Arc<dyn CommandExecutor>) -> Self {
        Self { cmd }
    }
}

impl DiscoveryChannel for NeighborTableChannel {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::NeighborTable
    }

    fn scan(&self, iface: &str) -> Result<Vec<ScannedDevice>, ToolError> {
        Ok(IpTool::new(self.cmd.as_ref())
            .neighbors(iface)?
            .into_iter()
            .map(|(ip, mac)| ScannedDevice { mac, ip: Some(ip) })
            .collect())
    }
}

pub struct SweepChannel {
    cmd: Arc<dyn CommandExecutor>,
    range: Ipv4Net,
}

impl SweepChannel {
    pub fn new(cmd: Arc<dyn CommandExecutor>, range: Ipv4Net) -> Self {
        Self { cmd, range }
    }
}

impl DiscoveryChannel for SweepChannel {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::ActiveSweep
    }

    fn scan(&self, iface: &str) -> Result<Vec<ScannedDevice>, ToolError> {
        ArpScan::new(self.cmd.as_ref()).sweep(iface, &self.range)
    }
}

pub struct VendorToolChannel {
    cmd: Arc<dyn CommandExecutor>,
    config: VendorToolConfig,
}

impl VendorToolChannel {
    pub fn new(cmd: Arc<dyn CommandExecutor>, config: VendorToolConfig) -> Self {
        Self { cmd, config }
    }
}

impl DiscoveryChannel for VendorToolChannel {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::VendorTool
    }

    fn scan(&self, _iface: &str) -> Result<Vec<ScannedDevice>, ToolError> {
        VendorTool::new(self.cmd.as_ref(), &self.config).list()
    }
}

pub struct DiscoveryScanner {
    channels: Vec<Arc<dyn DiscoveryChannel>>,
    prefixes: Vec<VendorPrefix>,
    poll_interval: Duration,
}

impl DiscoveryScanner {
    pub fn new(
        channels: Vec<Arc<dyn DiscoveryChannel>>,
        prefixes: Vec<VendorPrefix>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channels,
            prefixes,
            poll_interval,
        }
    }

    /// The standard channel set: neighbor table, sweep of `sweep_range`,
    /// and the vendor tool when one is configured.
    pub fn standard(
        cmd: Arc<dyn CommandExecutor>,
        sweep_range: Ipv4Net,
        vendor_tool: Option<&VendorToolConfig>,
        prefixes: Vec<VendorPrefix>,
        poll_interval: Duration,
    ) -> Self {
        let mut channels: Vec<Arc<dyn DiscoveryChannel>> = vec![
            Arc::new(NeighborTableChannel::new(Arc::clone(&cmd))),
            Arc::new(SweepChannel::new(Arc::clone(&cmd), sweep_range)),
        ];
        if let Some(config) = vendor_tool {
            channels.push(Arc::new(VendorToolChannel::new(cmd, config.clone())));
        }
        Self::new(channels, prefixes, poll_interval)
    }

    /// Run one pass over every channel.
    ///
    /// Channels scan concurrently on blocking threads. A channel still
    /// running at `until`, or when `token` is cancelled, is reported as an
    /// error and left to finish in the background.
    pub async fn pass(
        &self,
        iface: &str,
        until: Instant,
        token: &ShutdownToken,
    ) -> Vec<ChannelReport> {
        let scans: Vec<_> = self
            .channels
            .iter()
            .map(|channel| {
                let channel = Arc::clone(channel);
                let iface = iface.to_string();
                tokio::task::spawn_blocking(move || channel.scan(&iface))
            })
            .collect();

        let mut reports = Vec::with_capacity(scans.len());
        for (channel, scan) in self.channels.iter().zip(scans) {
            let status = tokio::select! {
                joined = tokio::time::timeout_at(until, scan) => match joined {
                    Ok(Ok(result)) => self.classify(result),
                    Ok(Err(e)) => ChannelStatus::Error {
                        detail: format!("scan task failed: {}", e),
                    },
                    Err(_) => {
                        warn!("Discovery via {} did not finish in time", channel.method());
                        ChannelStatus::Error {
                            detail: "timed out".to_string(),
                        }
                    }
                },
                _ = token.cancelled() => ChannelStatus::Error {
                    detail: "cancelled".to_string(),
                },
            };
            debug!("discovery via {}: {}", channel.method(), status);
            reports.push(ChannelReport {
                method: channel.method(),
                status,
            });
        }
        reports
    }

    fn classify(&self, result: Result<Vec<ScannedDevice>, ToolError>) -> ChannelStatus {
        match result {
            Ok(devices) => devices
                .into_iter()
                .find(|d| d.mac.matches_any(&self.prefixes))
                .map(|d| ChannelStatus::Found { mac: d.mac, ip: d.ip })
                .unwrap_or(ChannelStatus::NotFound),
            Err(ToolError::Unavailable(tool)) => ChannelStatus::Unavailable {
                detail: format!("{} not installed", tool),
            },
            Err(e) => ChannelStatus::Error {
                detail: e.to_string(),
            },
        }
    }

    /// Poll until a camera is found, `timeout` elapses or `token` is
    /// cancelled. A zero timeout runs exactly one pass. No pass runs past
    /// `timeout` plus one poll interval.
    pub async fn discover(
        &self,
        iface: &str,
        timeout: Duration,
        token: &ShutdownToken,
    ) -> DiscoveryOutcome {
        let deadline = Instant::now() + timeout;
        let scan_limit = deadline + self.poll_interval;
        let mut passes = 0;

        loop {
            passes += 1;
            let channels = self.pass(iface, scan_limit, token).await;
            if let Some(camera) = identify(&channels) {
                info!(
                    "Camera {} found via {} after {} pass(es)",
                    camera.mac, camera.method, passes
                );
                return DiscoveryOutcome {
                    camera: Some(camera),
                    channels,
                    passes,
                    cancelled: false,
                };
            }

            let now = Instant::now();
            if token.is_cancelled() || now >= deadline {
                return DiscoveryOutcome {
                    camera: None,
                    channels,
                    passes,
                    cancelled: token.is_cancelled(),
                };
            }

            let wait = self.poll_interval.min(deadline - now);
            debug!("No camera yet, next pass in {:?}", wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = token.cancelled() => {
                    info!("Discovery cancelled");
                    return DiscoveryOutcome {
                        camera: None,
                        channels,
                        passes,
                        cancelled: true,
                    };
                }
            }
        }
    }
}

/// The first channel (in channel order) that found a camera.
pub fn identify(channels: &[ChannelReport]) -> Option<CameraIdentity> {
    channels.iter().find_map(|report| match &report.status {
        ChannelStatus::Found { mac, ip } => Some(CameraIdentity {
            mac: *mac,
            ip: *ip,
            method: report.method,
            observed_at: Utc::now(),
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{link_local_range, VendorToolConfig};
    use crate::testing::{camera_mac, FakeHost};

    fn prefixes() -> Vec<VendorPrefix> {
        vec!["1C:0F:AF".parse().unwrap()]
    }

    fn scanner(host: &Arc<FakeHost>, vendor: &VendorToolConfig) -> DiscoveryScanner {
        DiscoveryScanner::standard(
            host.clone(),
            link_local_range(),
            Some(vendor),
            prefixes(),
            Duration::from_secs(2),
        )
    }

    async fn one_pass(scanner: &DiscoveryScanner) -> Vec<ChannelReport> {
        scanner
            .pass("eth0", Instant::now() + Duration::from_secs(5), &ShutdownToken::new())
            .await
    }

    /// A channel whose tool never answers within a test's patience.
    struct HungChannel(Duration);

    impl DiscoveryChannel for HungChannel {
        fn method(&self) -> DiscoveryMethod {
            DiscoveryMethod::VendorTool
        }

        fn scan(&self, _iface: &str) -> Result<Vec<ScannedDevice>, ToolError> {
            std::thread::sleep(self.0);
            Ok(Vec::new())
        }
    }

    fn with_hung_channel(host: &Arc<FakeHost>) -> DiscoveryScanner {
        DiscoveryScanner::new(
            vec![
                Arc::new(NeighborTableChannel::new(host.clone())),
                Arc::new(HungChannel(Duration::from_secs(2))),
            ],
            prefixes(),
            Duration::from_millis(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_network_times_out_without_hanging() {
        let host = Arc::new(FakeHost::new());
        let vendor = VendorToolConfig::default();
        let scanner = scanner(&host, &vendor);

        let start = Instant::now();
        let outcome = scanner
            .discover("eth0", Duration::from_secs(2), &ShutdownToken::new())
            .await;
        let elapsed = start.elapsed();

        assert!(!outcome.found());
        assert!(!outcome.cancelled);
        assert!(elapsed <= Duration::from_secs(4), "took {:?}", elapsed);
        assert!(outcome.passes >= 2);
        assert!(outcome
            .channels
            .iter()
            .all(|c| c.status == ChannelStatus::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_sweep_succeeds() {
        let host = Arc::new(FakeHost::new());
        host.with(|s| {
            s.sweep_devices = vec![
                (Ipv4Addr::new(169, 254, 9, 9), "00:1b:21:aa:bb:cc".parse().unwrap()),
                (Ipv4Addr::new(169, 254, 1, 2), camera_mac()),
            ];
            s.vendor_output = Err("IpConfigUtility: no adapters".to_string());
        });
        let vendor = VendorToolConfig::default();

        let outcome = scanner(&host, &vendor)
            .discover("eth0", Duration::from_secs(30), &ShutdownToken::new())
            .await;

        let camera = outcome.camera.unwrap();
        assert_eq!(camera.mac, camera_mac());
        assert_eq!(camera.ip, Some(Ipv4Addr::new(169, 254, 1, 2)));
        assert_eq!(camera.method, DiscoveryMethod::ActiveSweep);
        assert_eq!(outcome.passes, 1);

        assert_eq!(outcome.channels.len(), 3);
        assert_eq!(outcome.channels[0].status, ChannelStatus::NotFound);
        assert!(matches!(outcome.channels[1].status, ChannelStatus::Found { .. }));
        assert!(matches!(outcome.channels[2].status, ChannelStatus::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_channels_attempted_and_first_wins() {
        let host = Arc::new(FakeHost::new());
        host.with(|s| {
            s.neighbors = vec![(Ipv4Addr::new(169, 254, 1, 2), camera_mac())];
            s.sweep_devices = vec![(Ipv4Addr::new(169, 254, 1, 2), camera_mac())];
            s.vendor_output = Ok("[0] 1C0FAF123456 169.254.1.2 255.255.0.0\n".to_string());
        });
        let vendor = VendorToolConfig::default();

        let outcome = scanner(&host, &vendor)
            .discover("eth0", Duration::from_secs(30), &ShutdownToken::new())
            .await;

        assert_eq!(outcome.camera.unwrap().method, DiscoveryMethod::NeighborTable);
        assert!(outcome
            .channels
            .iter()
            .all(|c| matches!(c.status, ChannelStatus::Found { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_appearing_after_boot_delay() {
        let host = Arc::new(FakeHost::new());
        let vendor = VendorToolConfig::default();
        let booted = host.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            booted.with(|s| s.neighbors = vec![(Ipv4Addr::new(169, 254, 1, 2), camera_mac())]);
        });

        let outcome = scanner(&host, &vendor)
            .discover("eth0", Duration::from_secs(30), &ShutdownToken::new())
            .await;

        assert!(outcome.found());
        assert!(outcome.passes > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_not_found_early() {
        let host = Arc::new(FakeHost::new());
        let vendor = VendorToolConfig::default();
        let token = ShutdownToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = scanner(&host, &vendor)
            .discover("eth0", Duration::from_secs(60), &token)
            .await;

        assert!(!outcome.found());
        assert!(outcome.cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_single_pass() {
        let host = Arc::new(FakeHost::new());
        let vendor = VendorToolConfig::default();
        let outcome = scanner(&host, &vendor)
            .discover("eth0", Duration::ZERO, &ShutdownToken::new())
            .await;
        assert_eq!(outcome.passes, 1);
    }

    #[tokio::test]
    async fn test_missing_tools_reported_per_channel() {
        let host = Arc::new(FakeHost::new());
        host.with(|s| {
            s.missing.insert("arp-scan");
            s.missing.insert(crate::testing::VENDOR_TOOL);
        });
        let vendor = VendorToolConfig::default();
        let reports = one_pass(&scanner(&host, &vendor)).await;
        assert_eq!(reports[0].status, ChannelStatus::NotFound);
        assert!(matches!(reports[1].status, ChannelStatus::Unavailable { .. }));
        assert!(matches!(reports[2].status, ChannelStatus::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_other_vendors_ignored() {
        let host = Arc::new(FakeHost::new());
        host.with(|s| {
            s.neighbors = vec![(Ipv4Addr::new(169, 254, 7, 7), "00:1b:21:aa:bb:cc".parse().unwrap())];
        });
        let vendor = VendorToolConfig::default();
        let reports = one_pass(&scanner(&host, &vendor)).await;
        assert_eq!(reports[0].status, ChannelStatus::NotFound);
        assert!(identify(&reports).is_none());
    }

    #[tokio::test]
    async fn test_hung_channel_is_cut_off_at_deadline() {
        let host = Arc::new(FakeHost::new());
        let scanner = with_hung_channel(&host);

        let start = std::time::Instant::now();
        let outcome = scanner
            .discover("eth0", Duration::from_millis(200), &ShutdownToken::new())
            .await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
        assert!(!outcome.found());
        assert!(!outcome.cancelled);
        assert_eq!(outcome.channels[0].status, ChannelStatus::NotFound);
        assert_eq!(
            outcome.channels[1].status,
            ChannelStatus::Error {
                detail: "timed out".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_hung_channel_does_not_hide_camera() {
        let host = Arc::new(FakeHost::new());
        host.with(|s| s.neighbors = vec![(Ipv4Addr::new(169, 254, 1, 2), camera_mac())]);
        let scanner = with_hung_channel(&host);

        let start = std::time::Instant::now();
        let outcome = scanner
            .discover("eth0", Duration::ZERO, &ShutdownToken::new())
            .await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome.camera.unwrap().method, DiscoveryMethod::NeighborTable);
        assert!(matches!(outcome.channels[1].status, ChannelStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_hung_channel() {
        let host = Arc::new(FakeHost::new());
        let scanner = with_hung_channel(&host);
        let token = ShutdownToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let outcome = scanner.discover("eth0", Duration::from_secs(60), &token).await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(outcome.cancelled);
        assert_eq!(
            outcome.channels[1].status,
            ChannelStatus::Error {
                detail: "cancelled".to_string()
            }
        );
    }
}
