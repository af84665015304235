//! Diagnose command: probe the current configuration and look for the camera.
//!
//! Nothing on the host is changed. The report is printed either as text,
//! one line per check with its remediation, or as JSON for scripts.

pub mod output;
pub mod runner;

use anyhow::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::fs_abstraction::real_fs;
use crate::probe::CheckStatus;
use crate::signal::{ShutdownGuard, ShutdownToken};

pub use output::{DiagnosticReport, DiagnosticSummary, SystemInfo};
pub use runner::DiagnosticReporter;

/// Run the diagnose command and return the process exit code.
pub async fn run(config: &Config, json: bool, timeout_secs: u64) -> Result<u8> {
    let token = ShutdownToken::new();
    let _guard = ShutdownGuard::new(token.clone());
    let cmd = Arc::new(RealCommandExecutor::new());

    let report = match DiagnosticReporter::new(cmd, real_fs(), config)
        .run(Duration::from_secs(timeout_secs), &token)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return Ok(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(0)
}

/// Render the human-readable report.
pub fn format_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== gigelink diagnostic report ===");
    let _ = writeln!(out, "Timestamp: {}", report.timestamp);
    let _ = writeln!(out, "Duration: {}ms", report.duration_ms);
    let iface = &report.interface;
    let _ = writeln!(
        out,
        "Interface: {} ({}, {})",
        iface.name,
        iface.kind.as_str(),
        if iface.link_up { "up" } else { "down" }
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Checks:");
    for check in &report.checks {
        let icon = match check.status {
            CheckStatus::Ok => "[OK]",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        let _ = writeln!(
            out,
            "  {:<7}{}: {} (target {})",
            icon, check.name, check.current, check.target
        );
        if let Some(remediation) = &check.remediation {
            let _ = writeln!(out, "         fix: {}", remediation);
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Discovery:");
    for channel in &report.channels {
        let _ = writeln!(out, "  {}: {}", channel.method, channel.status);
    }
    match &report.camera {
        Some(camera) => {
            let _ = writeln!(out, "  Camera: {} via {}", camera.mac, camera.method);
            if let Some(ip) = camera.ip {
                if ip != report.expected_camera_address {
                    let _ = writeln!(
                        out,
                        "  Note: camera answered at {}, not the configured {}",
                        ip, report.expected_camera_address
                    );
                }
            }
        }
        None => {
            let _ = writeln!(out, "  Camera: not found");
        }
    }
    let _ = writeln!(out);

    let s = &report.summary;
    let _ = writeln!(
        out,
        "Summary: {} checks | OK: {} | WARN: {} | FAIL: {}",
        s.total, s.ok, s.warnings, s.failed
    );
    if let Some(info) = &report.system_info {
        let _ = writeln!(
            out,
            "System: {} (kernel {}) on {}{}",
            info.os,
            info.kernel,
            info.hostname,
            if info.is_root { "" } else { ", not root" }
        );
    }

    let pending = report.actionable().count();
    let status = if report.is_healthy() && pending == 0 {
        "HEALTHY - link configured and camera answering".to_string()
    } else if report.is_healthy() {
        format!("HEALTHY - {} advisory warning(s)", pending)
    } else if s.failed == 0 {
        "DEGRADED - configuration matches but no camera answered".to_string()
    } else {
        format!("UNHEALTHY - {} check(s) need attention", pending)
    };
    let _ = writeln!(out, "Overall Status: {}", status);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ChannelReport, ChannelStatus, DiscoveryMethod, DiscoveryOutcome};
    use crate::interfaces::{InterfaceKind, NetworkInterface};
    use crate::probe::{TunableCheck, FIREWALL, MTU};
    use std::net::Ipv4Addr;

    fn report() -> DiagnosticReport {
        let interface = NetworkInterface {
            name: "eth0".to_string(),
            kind: InterfaceKind::Wired,
            link_up: true,
            carrier: true,
            mtu: Some(1500),
            addresses: Vec::new(),
            ring: None,
        };
        let checks = vec![
            TunableCheck::compare(MTU, "1500", "9000", false, "ip link set dev eth0 mtu 9000"),
            TunableCheck::warn(FIREWALL, "unknown (ufw not installed)", "allow", "install ufw"),
        ];
        let discovery = DiscoveryOutcome {
            camera: None,
            channels: vec![ChannelReport {
                method: DiscoveryMethod::ActiveSweep,
                status: ChannelStatus::NotFound,
            }],
            passes: 1,
            cancelled: false,
        };
        DiagnosticReport::new(interface, checks, discovery, Ipv4Addr::new(169, 254, 1, 2), 3)
    }

    #[test]
    fn test_format_report_lists_every_remediation() {
        let text = format_report(&report());
        assert!(text.contains("[FAIL] mtu: 1500 (target 9000)"));
        assert!(text.contains("fix: ip link set dev eth0 mtu 9000"));
        assert!(text.contains("[WARN] firewall"));
        assert!(text.contains("fix: install ufw"));
        assert!(text.contains("Camera: not found"));
        assert!(text.contains("OK: 0 | WARN: 1 | FAIL: 1"));
        assert!(text.contains("Overall Status: UNHEALTHY - 2 check(s) need attention"));
    }

    #[test]
    fn test_overall_status_follows_checks_and_camera() {
        let mut report = report();
        report.checks.retain(|c| c.status != CheckStatus::Fail);
        report.summary = DiagnosticSummary::from_checks(&report.checks, false);
        assert!(format_report(&report).contains("DEGRADED - configuration matches but no camera"));

        report.summary.camera_found = true;
        assert!(format_report(&report).contains("HEALTHY - 1 advisory warning(s)"));

        report.checks.clear();
        report.summary = DiagnosticSummary::from_checks(&report.checks, true);
        assert!(format_report(&report)
            .contains("Overall Status: HEALTHY - link configured and camera answering"));
    }
}
