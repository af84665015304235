//! Setup command: configure the interface, persist it, find the camera.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::applier::StepStatus;
use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::fs_abstraction::real_fs;
use crate::interfaces::NetworkInterface;
use crate::orchestrator::{SetupOptions, SetupOrchestrator, SetupResult};
use crate::persistence::ArtifactStatus;
use crate::probe::CheckStatus;
use crate::signal::{ShutdownGuard, ShutdownToken};
use crate::utils::{check_root, exit_code};

/// Run the setup command and return the process exit code.
pub async fn run(config: &Config, yes: bool, no_persist: bool, timeout: Option<u64>) -> Result<u8> {
    check_root()?;

    let options = SetupOptions {
        persist: !no_persist,
        discovery_timeout: timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.discovery_timeout()),
    };
    let confirm = |iface: &NetworkInterface| yes || confirm_wireless(iface);

    let cmd = Arc::new(RealCommandExecutor::new());
    let orchestrator = SetupOrchestrator::new(cmd, real_fs(), config);
    let iface = orchestrator.select(&confirm).context("Setup aborted")?;

    // Ctrl-C keeps its default meaning until the interface is settled
    let token = ShutdownToken::new();
    let _guard = ShutdownGuard::new(token.clone());
    let result = orchestrator
        .run(iface, &options, &token)
        .await
        .context("Setup aborted")?;

    print!("{}", format_summary(&result));
    if result.error_count == 0 {
        info!("Setup complete");
    }
    Ok(exit_code(result.error_count))
}

fn confirm_wireless(iface: &NetworkInterface) -> bool {
    print!(
        "{} looks like a wireless interface. Configure it for the camera anyway? [y/N] ",
        iface.name
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Render the end-of-run summary.
pub fn format_summary(result: &SetupResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== gigelink setup: {} ===", result.interface.name);

    let _ = writeln!(out, "Steps:");
    for outcome in &result.steps {
        let label = match &outcome.status {
            StepStatus::Applied => "applied".to_string(),
            StepStatus::Unchanged => "unchanged".to_string(),
            StepStatus::Skipped(reason) => format!("skipped ({})", reason),
            StepStatus::Failed(detail) => format!("FAILED ({})", detail),
            StepStatus::ToolUnavailable(tool) => format!("{} not installed", tool),
        };
        let _ = writeln!(out, "  {:<20} {}", outcome.step.to_string(), label);
        if let Some(remediation) = &outcome.remediation {
            let _ = writeln!(out, "  {:<20} fix: {}", "", remediation);
        }
    }

    if let Some(report) = &result.persistence {
        let _ = writeln!(out, "Persisted:");
        for outcome in &report.outcomes {
            let label = match &outcome.status {
                ArtifactStatus::Written => "written".to_string(),
                ArtifactStatus::Unchanged => "unchanged".to_string(),
                ArtifactStatus::Skipped(reason) => format!("skipped ({})", reason),
                ArtifactStatus::Failed(detail) => format!("FAILED ({})", detail),
            };
            let _ = writeln!(out, "  {} {}", outcome.path.display(), label);
        }
    }
    if result.daemon_stopped {
        let _ = writeln!(
            out,
            "NetworkManager was stopped; the persisted exemption keeps the interface unmanaged after a restart."
        );
    }

    let _ = writeln!(out, "Discovery:");
    for channel in &result.channels {
        let _ = writeln!(out, "  {}: {}", channel.method, channel.status);
    }
    match &result.camera {
        Some(camera) => {
            let _ = writeln!(out, "  Camera {} found via {}", camera.mac, camera.method);
        }
        None => {
            let _ = writeln!(out, "  No camera found");
        }
    }
    if let Some(note) = result.camera_address_note() {
        let _ = writeln!(out, "  Note: {}", note);
    }

    let _ = writeln!(out, "Checks:");
    for check in &result.checks {
        let icon = match check.status {
            CheckStatus::Ok => "[OK]",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        let _ = writeln!(out, "  {:<7}{}: {}", icon, check.name, check.current);
        if let Some(remediation) = &check.remediation {
            let _ = writeln!(out, "         fix: {}", remediation);
        }
    }

    let _ = writeln!(out, "Errors: {}", result.error_count);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::{Step, StepOutcome};
    use crate::discovery::{CameraIdentity, ChannelReport, ChannelStatus, DiscoveryMethod};
    use crate::interfaces::InterfaceKind;
    use crate::persistence::{Artifact, ArtifactOutcome, PersistReport};
    use crate::probe::{TunableCheck, FIREWALL, RING_BUFFER};
    use crate::testing::camera_mac;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    fn result() -> SetupResult {
        SetupResult {
            interface: NetworkInterface {
                name: "eth0".to_string(),
                kind: InterfaceKind::Wired,
                link_up: true,
                carrier: true,
                mtu: Some(9000),
                addresses: Vec::new(),
                ring: None,
            },
            steps: vec![
                StepOutcome {
                    step: Step::Mtu,
                    status: StepStatus::Applied,
                    remediation: None,
                },
                StepOutcome {
                    step: Step::RingBuffer,
                    status: StepStatus::Failed("Operation not supported".to_string()),
                    remediation: Some("ethtool -G eth0 rx 4096".to_string()),
                },
            ],
            persistence: Some(PersistReport {
                outcomes: vec![ArtifactOutcome {
                    artifact: Artifact::SysctlConf,
                    path: PathBuf::from("/etc/sysctl.conf"),
                    status: ArtifactStatus::Unchanged,
                }],
            }),
            camera: Some(CameraIdentity {
                mac: camera_mac(),
                ip: Some(Ipv4Addr::new(169, 254, 9, 9)),
                method: DiscoveryMethod::ActiveSweep,
                observed_at: chrono::Utc::now(),
            }),
            channels: vec![ChannelReport {
                method: DiscoveryMethod::ActiveSweep,
                status: ChannelStatus::Found {
                    mac: camera_mac(),
                    ip: Some(Ipv4Addr::new(169, 254, 9, 9)),
                },
            }],
            checks: vec![
                TunableCheck::compare(RING_BUFFER, "256", "4096", false, "ethtool -G eth0 rx 4096"),
                TunableCheck::warn(FIREWALL, "unknown (ufw not installed)", "allow", "install ufw"),
            ],
            expected_camera_address: Ipv4Addr::new(169, 254, 1, 2),
            daemon_stopped: false,
            error_count: 2,
        }
    }

    #[test]
    fn test_summary_lists_every_remediation() {
        let text = format_summary(&result());
        assert!(text.contains("FAILED (Operation not supported)"));
        assert!(text.contains("fix: ethtool -G eth0 rx 4096"));
        assert!(text.contains("fix: install ufw"));
        assert!(text.contains("/etc/sysctl.conf unchanged"));
        assert!(text.contains("Errors: 2"));
    }

    #[test]
    fn test_summary_notes_unexpected_camera_address() {
        let text = format_summary(&result());
        assert!(text.contains("Note: camera"));
        assert!(text.contains("169.254.9.9"));
    }
}
