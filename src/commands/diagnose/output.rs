//! Structured diagnostic report.
//!
//! The same structure backs the human-readable output and `--json`, so
//! scripts and people see identical results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::cmd_abstraction::CommandExecutor;
use crate::discovery::{CameraIdentity, ChannelReport, DiscoveryOutcome};
use crate::fs_abstraction::FileSystem;
use crate::interfaces::NetworkInterface;
use crate::probe::{tally, CheckStatus, TunableCheck};

/// Check counts and whether a camera answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    pub ok: usize,
    pub warnings: usize,
    pub failed: usize,
    pub camera_found: bool,
}

impl DiagnosticSummary {
    pub fn from_checks(checks: &[TunableCheck], camera_found: bool) -> Self {
        let (ok, warnings, failed) = tally(checks);
        Self {
            total: checks.len(),
            ok,
            warnings,
            failed,
            camera_found,
        }
    }
}

/// Complete diagnostic report
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// Report version for compatibility
    pub version: String,

    /// Timestamp when the diagnostic was run
    pub timestamp: DateTime<Utc>,

    /// Total duration in milliseconds
    pub duration_ms: u64,

    pub gigelink_version: String,

    pub interface: NetworkInterface,

    pub summary: DiagnosticSummary,

    /// One entry per probe check, in probe order
    pub checks: Vec<TunableCheck>,

    pub camera: Option<CameraIdentity>,

    /// Last result of every discovery channel
    pub channels: Vec<ChannelReport>,

    /// Configured camera address (advisory)
    pub expected_camera_address: Ipv4Addr,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,
}

impl DiagnosticReport {
    pub fn new(
        interface: NetworkInterface,
        checks: Vec<TunableCheck>,
        discovery: DiscoveryOutcome,
        expected_camera_address: Ipv4Addr,
        duration_ms: u64,
    ) -> Self {
        let summary = DiagnosticSummary::from_checks(&checks, discovery.found());
        Self {
            version: "1.0".to_string(),
            timestamp: Utc::now(),
            duration_ms,
            gigelink_version: env!("CARGO_PKG_VERSION").to_string(),
            interface,
            summary,
            checks,
            camera: discovery.camera,
            channels: discovery.channels,
            expected_camera_address,
            system_info: None,
        }
    }

    /// Add system information to the report
    pub fn with_system_info(mut self, info: SystemInfo) -> Self {
        self.system_info = Some(info);
        self
    }

    /// No failed check and a camera answered. Warnings are allowed.
    pub fn is_healthy(&self) -> bool {
        self.summary.failed == 0 && self.summary.camera_found
    }

    /// Checks that need attention, each with its remediation.
    pub fn actionable(&self) -> impl Iterator<Item = &TunableCheck> {
        self.checks.iter().filter(|c| c.status != CheckStatus::Ok)
    }
}

/// Host context included with the report.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub kernel: String,
    pub hostname: String,
    pub is_root: bool,
    /// External tools found on this host
    pub available_tools: Vec<String>,
}

impl SystemInfo {
    /// Collect system information; `tools` are checked through `cmd`.
    pub fn collect(cmd: &dyn CommandExecutor, fs: &dyn FileSystem, tools: &[&str]) -> Self {
        // SAFETY: geteuid() has no preconditions and cannot fail.
        let is_root = unsafe { libc::geteuid() == 0 };

        let read = |path: &str| fs.read_to_string(Path::new(path)).ok();
        let kernel = read("/proc/version")
            .and_then(|v| v.split_whitespace().nth(2).map(String::from))
            .unwrap_or_else(|| "unknown".to_string());
        let hostname = read("/etc/hostname")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let os = read("/etc/os-release")
            .as_deref()
            .and_then(pretty_name)
            .unwrap_or_else(|| "Linux".to_string());

        let available_tools = tools
            .iter()
            .filter(|t| cmd.is_available(t))
            .map(|t| t.to_string())
            .collect();

        Self {
            os,
            kernel,
            hostname,
            is_root,
            available_tools,
        }
    }
}

/// `PRETTY_NAME` from an os-release file.
fn pretty_name(os_release: &str) -> Option<String> {
    os_release
        .lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
}
