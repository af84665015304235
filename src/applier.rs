//! Drive the host toward the target configuration.
//!
//! Steps run in a fixed order because each depends on kernel state left by
//! the previous one. Every step checks the current value first and only
//! mutates when the target is not met, so a second run reports
//! [`StepStatus::Unchanged`] throughout. A failed step is recorded and the
//! next one still runs.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::cmd_abstraction::CommandExecutor;
use crate::config::TargetSet;
use crate::error::ToolError;
use crate::persistence::{ArtifactStatus, PersistenceWriter};
use crate::signal::ShutdownToken;
use crate::tools::ethtool::Ethtool;
use crate::tools::firewall::{Ufw, UFW};
use crate::tools::ip::IpTool;
use crate::tools::network_manager::NetworkManager;
use crate::tools::sysctl::{rp_filter_key, Sysctl, RMEM_DEFAULT, RMEM_MAX, RP_FILTER_ALL};
use crate::utils::format_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    LinkUp,
    Mtu,
    RingBuffer,
    SocketBuffers,
    RpFilter,
    Firewall,
    NetworkManager,
    FlushAddresses,
    AssignAddress,
}

/// Mutation order.
pub const STEP_ORDER: [Step; 9] = [
    Step::LinkUp,
    Step::Mtu,
    Step::RingBuffer,
    Step::SocketBuffers,
    Step::RpFilter,
    Step::Firewall,
    Step::NetworkManager,
    Step::FlushAddresses,
    Step::AssignAddress,
];

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::LinkUp => "link up",
            Step::Mtu => "mtu",
            Step::RingBuffer => "ring buffer",
            Step::SocketBuffers => "socket buffers",
            Step::RpFilter => "rp_filter",
            Step::Firewall => "firewall",
            Step::NetworkManager => "network manager",
            Step::FlushAddresses => "flush addresses",
            Step::AssignAddress => "assign address",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Unchanged,
    Skipped(String),
    Failed(String),
    ToolUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed(_))
    }
}

/// Run state threaded through one setup run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub iface: String,
    pub targets: TargetSet,
    /// Maximum RX ring size reported by the NIC, once queried
    pub ring_max: Option<u32>,
    /// Link confirmed administratively up after the link step
    pub link_up: bool,
    /// NetworkManager was stopped (rather than exempted) during this run
    pub daemon_stopped: bool,
}

impl RunContext {
    pub fn new(iface: &str, targets: TargetSet) -> Self {
        Self {
            iface: iface.to_string(),
            targets,
            ring_max: None,
            link_up: false,
            daemon_stopped: false,
        }
    }
}

/// Number of failed steps.
pub fn error_count(outcomes: &[StepOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_failure()).count()
}

pub struct ConfigApplier<'a> {
    cmd: &'a dyn CommandExecutor,
    persistence: &'a PersistenceWriter<'a>,
    token: Option<&'a ShutdownToken>,
}

impl<'a> ConfigApplier<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor, persistence: &'a PersistenceWriter<'a>) -> Self {
        Self {
            cmd,
            persistence,
            token: None,
        }
    }

    /// Skip the remaining steps once `token` is cancelled.
    pub fn cancellable(mut self, token: &'a ShutdownToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn apply(&self, ctx: &mut RunContext) -> Vec<StepOutcome> {
        STEP_ORDER
            .iter()
            .map(|&step| {
                let status = if self.token.map_or(false, ShutdownToken::is_cancelled) {
                    StepStatus::Skipped("interrupted".to_string())
                } else {
                    match self.run_step(step, ctx) {
                        Ok(status) => status,
                        Err(ToolError::Unavailable(tool)) => StepStatus::ToolUnavailable(tool),
                        Err(e) => StepStatus::Failed(e.to_string()),
                    }
                };
                match &status {
                    StepStatus::Applied => info!("{}: applied", step),
                    StepStatus::Unchanged => debug!("{}: already at target", step),
                    StepStatus::Skipped(why) => info!("{}: skipped ({})", step, why),
                    StepStatus::ToolUnavailable(tool) => {
                        warn!("{}: {} not installed, step skipped", step, tool)
                    }
                    StepStatus::Failed(why) => warn!("{}: failed: {}", step, why),
                }
                let remediation = match status {
                    StepStatus::Failed(_) | StepStatus::ToolUnavailable(_) => {
                        Some(remediation(step, ctx))
                    }
                    _ => None,
                };
                StepOutcome {
                    step,
                    status,
                    remediation,
                }
            })
            .collect()
    }

    fn run_step(&self, step: Step, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        match step {
            Step::LinkUp => self.link_up(ctx),
            Step::Mtu => self.mtu(ctx),
            Step::RingBuffer => self.ring_buffer(ctx),
            Step::SocketBuffers => self.socket_buffers(ctx),
            Step::RpFilter => self.rp_filter(ctx),
            Step::Firewall => self.firewall(ctx),
            Step::NetworkManager => self.network_manager(ctx),
            Step::FlushAddresses => self.flush_addresses(ctx),
            Step::AssignAddress => self.assign_address(ctx),
        }
    }

    fn link_up(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let ip = IpTool::new(self.cmd);
        if ip.link(&ctx.iface)?.admin_up {
            ctx.link_up = true;
            return Ok(StepStatus::Unchanged);
        }
        ip.set_up(&ctx.iface)?;
        ctx.link_up = ip.link(&ctx.iface)?.admin_up;
        if ctx.link_up {
            Ok(StepStatus::Applied)
        } else {
            Ok(StepStatus::Failed("link still down after 'ip link set up'".to_string()))
        }
    }

    fn mtu(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let ip = IpTool::new(self.cmd);
        if ip.link(&ctx.iface)?.mtu == ctx.targets.mtu {
            return Ok(StepStatus::Unchanged);
        }
        ip.set_mtu(&ctx.iface, ctx.targets.mtu)?;
        Ok(StepStatus::Applied)
    }

    fn ring_buffer(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let ethtool = Ethtool::new(self.cmd);
        let ring = match ethtool.ring(&ctx.iface) {
            Ok(ring) => ring,
            Err(ToolError::Failed { detail, .. }) => {
                return Ok(StepStatus::Skipped(format!("driver reports no ring control: {}", detail)))
            }
            Err(e) => return Err(e),
        };
        ctx.ring_max = Some(ring.rx_max);
        if ring.at_max() {
            return Ok(StepStatus::Unchanged);
        }
        ethtool.set_rx(&ctx.iface, ring.rx_max)?;
        Ok(StepStatus::Applied)
    }

    fn socket_buffers(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let sysctl = Sysctl::new(self.cmd);
        let mut changed = false;
        for key in [RMEM_DEFAULT, RMEM_MAX] {
            let current = sysctl.get(key)?;
            if current < ctx.targets.socket_buffer_min {
                debug!(
                    "{} is {}, raising to {}",
                    key,
                    format_bytes(current),
                    format_bytes(ctx.targets.socket_buffer_bytes)
                );
                sysctl.set(key, ctx.targets.socket_buffer_bytes)?;
                changed = true;
            }
        }
        Ok(if changed {
            StepStatus::Applied
        } else {
            StepStatus::Unchanged
        })
    }

    /// Session values for `all` and the interface, then the hardening file
    /// so filtering is not re-enabled at boot.
    fn rp_filter(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let sysctl = Sysctl::new(self.cmd);
        let mut changed = false;
        for key in [RP_FILTER_ALL.to_string(), rp_filter_key(&ctx.iface)] {
            if sysctl.get(&key)? != 0 {
                sysctl.set(&key, 0)?;
                changed = true;
            }
        }

        match self.persistence.hardening_sysctl(&ctx.iface).status {
            ArtifactStatus::Written => changed = true,
            ArtifactStatus::Failed(e) => {
                return Ok(StepStatus::Failed(format!(
                    "session set, but hardening file not updated: {}",
                    e
                )))
            }
            ArtifactStatus::Unchanged | ArtifactStatus::Skipped(_) => {}
        }

        Ok(if changed {
            StepStatus::Applied
        } else {
            StepStatus::Unchanged
        })
    }

    fn firewall(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let ufw = Ufw::new(self.cmd);
        if !ufw.is_installed() {
            return Err(ToolError::Unavailable(UFW.to_string()));
        }
        let status = ufw.status()?;
        if !status.active {
            return Ok(StepStatus::Skipped("firewall inactive".to_string()));
        }

        let range = ctx.targets.firewall_range;
        let mut changed = false;
        if !status.allows_udp_from(&range) {
            ufw.allow_udp_from(&range)?;
            changed = true;
        }
        for &port in &ctx.targets.tcp_ports {
            if !status.allows_tcp_port_from(&range, port) {
                ufw.allow_tcp_port_from(&range, port)?;
                changed = true;
            }
        }
        if !changed {
            return Ok(StepStatus::Unchanged);
        }
        ufw.reload()?;
        Ok(StepStatus::Applied)
    }

    /// Prefer exempting the interface; stop the daemon only if that fails.
    /// A stopped daemon stays stopped: the persisted exemption covers the
    /// next start.
    fn network_manager(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let nm = NetworkManager::new(self.cmd);
        if !nm.is_active()? {
            return Ok(StepStatus::Unchanged);
        }
        match nm.device_state(&ctx.iface) {
            Ok(Some(state)) if state == "unmanaged" => return Ok(StepStatus::Unchanged),
            Ok(_) => {}
            Err(e) => debug!("nmcli device query failed: {}", e),
        }

        match nm.set_unmanaged(&ctx.iface) {
            Ok(()) => Ok(StepStatus::Applied),
            Err(e) => {
                warn!("Could not exempt {} ({}), stopping NetworkManager", ctx.iface, e);
                nm.stop()?;
                ctx.daemon_stopped = true;
                Ok(StepStatus::Applied)
            }
        }
    }

    fn flush_addresses(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        if !ctx.link_up {
            return Ok(StepStatus::Skipped("link not up".to_string()));
        }
        let ip = IpTool::new(self.cmd);
        let current = ip.addresses(&ctx.iface)?;
        if current.is_empty() || current == [ctx.targets.host] {
            return Ok(StepStatus::Unchanged);
        }
        ip.flush_ipv4(&ctx.iface)?;
        Ok(StepStatus::Applied)
    }

    fn assign_address(&self, ctx: &mut RunContext) -> Result<StepStatus, ToolError> {
        let ip = IpTool::new(self.cmd);
        if ip.addresses(&ctx.iface)?.contains(&ctx.targets.host) {
            return Ok(StepStatus::Unchanged);
        }
        ip.add_address(&ctx.iface, ctx.targets.host)?;
        Ok(StepStatus::Applied)
    }
}

/// The manual command for a step that did not reach its target.
pub fn remediation(step: Step, ctx: &RunContext) -> String {
    let iface = &ctx.iface;
    let t = &ctx.targets;
    match step {
        Step::LinkUp => format!("ip link set dev {} up", iface),
        Step::Mtu => format!("ip link set dev {} mtu {}", iface, t.mtu),
        Step::RingBuffer => match ctx.ring_max {
            Some(max) => format!("ethtool -G {} rx {}", iface, max),
            None => format!("ethtool -g {}  # then ethtool -G {} rx <max>", iface, iface),
        },
        Step::SocketBuffers => format!(
            "sysctl -w {}={} && sysctl -w {}={}",
            RMEM_DEFAULT, t.socket_buffer_bytes, RMEM_MAX, t.socket_buffer_bytes
        ),
        Step::RpFilter => format!(
            "sysctl -w {}=0 && sysctl -w {}=0",
            RP_FILTER_ALL,
            rp_filter_key(iface)
        ),
        Step::Firewall => format!(
            "ufw allow from {} to any proto udp && ufw reload",
            t.firewall_range
        ),
        Step::NetworkManager => format!(
            "nmcli device set {} managed no || systemctl stop NetworkManager",
            iface
        ),
        Step::FlushAddresses => format!("ip -4 addr flush dev {}", iface),
        Step::AssignAddress => format!("ip addr add {} dev {}", t.host, iface),
    }
}
