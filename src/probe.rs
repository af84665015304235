//! Read-only probe of every tunable the camera link depends on.
//!
//! [`ConfigProbe::probe`] always returns the same eight checks in the same
//! order. Each check queries the host on its own; a failed or missing tool
//! affects only the check that needed it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::cmd_abstraction::CommandExecutor;
use crate::config::{link_local_range, TargetSet};
use crate::error::ToolError;
use crate::fs_abstraction::FileSystem;
use crate::tools::ethtool::Ethtool;
use crate::tools::firewall::Ufw;
use crate::tools::ip::{IpTool, LinkInfo};
use crate::tools::network_manager::{config_ignores, NetworkManager};
use crate::tools::sysctl::{rp_filter_key, Sysctl, RMEM_DEFAULT, RMEM_MAX, RP_FILTER_ALL};

pub const LINK_STATE: &str = "link_state";
pub const IPV4_LINK_LOCAL: &str = "ipv4_link_local";
pub const MTU: &str = "mtu";
pub const RP_FILTER: &str = "rp_filter";
pub const RING_BUFFER: &str = "ring_buffer";
pub const SOCKET_RMEM: &str = "socket_rmem";
pub const FIREWALL: &str = "firewall";
pub const NETWORK_MANAGER: &str = "network_manager";

/// Check names in probe order.
pub const CHECK_ORDER: [&str; 8] = [
    LINK_STATE,
    IPV4_LINK_LOCAL,
    MTU,
    RP_FILTER,
    RING_BUFFER,
    SOCKET_RMEM,
    FIREWALL,
    NETWORK_MANAGER,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "OK"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// One probed parameter: what the host reports against what we want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunableCheck {
    pub name: String,
    pub current: String,
    pub target: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl TunableCheck {
    /// OK when `meets` holds, FAIL with `remediation` otherwise.
    pub fn compare(
        name: &str,
        current: impl Into<String>,
        target: impl Into<String>,
        meets: bool,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            current: current.into(),
            target: target.into(),
            status: if meets {
                CheckStatus::Ok
            } else {
                CheckStatus::Fail
            },
            remediation: if meets {
                None
            } else {
                Some(remediation.into())
            },
        }
    }

    /// Advisory result: the value could not be judged or needs a human.
    pub fn warn(
        name: &str,
        current: impl Into<String>,
        target: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            current: current.into(),
            target: target.into(),
            status: CheckStatus::Warn,
            remediation: Some(remediation.into()),
        }
    }

    /// Map a query error: a missing tool or a refusal to run unprivileged
    /// is a WARN, anything else a FAIL.
    fn from_error(
        name: &str,
        target: impl Into<String>,
        err: &ToolError,
        remediation: impl Into<String>,
    ) -> Self {
        match err {
            ToolError::Unavailable(tool) => Self::warn(
                name,
                format!("unknown ({} not installed)", tool),
                target,
                format!("install {}", tool),
            ),
            ToolError::Failed { tool, .. } if err.needs_privilege() => Self::warn(
                name,
                format!("unknown ({} needs root)", tool),
                target,
                "run as root to inspect",
            ),
            other => Self {
                name: name.to_string(),
                current: format!("unknown ({})", other),
                target: target.into(),
                status: CheckStatus::Fail,
                remediation: Some(remediation.into()),
            },
        }
    }
}

/// Count checks by status: (ok, warn, fail).
pub fn tally(checks: &[TunableCheck]) -> (usize, usize, usize) {
    checks.iter().fold((0, 0, 0), |(ok, warn, fail), c| match c.status {
        CheckStatus::Ok => (ok + 1, warn, fail),
        CheckStatus::Warn => (ok, warn + 1, fail),
        CheckStatus::Fail => (ok, warn, fail + 1),
    })
}

pub struct ConfigProbe<'a> {
    cmd: &'a dyn CommandExecutor,
    fs: &'a dyn FileSystem,
    targets: &'a TargetSet,
    nm_conf: &'a Path,
}

impl<'a> ConfigProbe<'a> {
    pub fn new(
        cmd: &'a dyn CommandExecutor,
        fs: &'a dyn FileSystem,
        targets: &'a TargetSet,
        nm_conf: &'a Path,
    ) -> Self {
        Self {
            cmd,
            fs,
            targets,
            nm_conf,
        }
    }

    pub fn probe(&self, iface: &str) -> Vec<TunableCheck> {
        let link = IpTool::new(self.cmd).link(iface);
        vec![
            self.link_state(iface, &link),
            self.ipv4_link_local(iface),
            self.mtu(iface, &link),
            self.rp_filter(iface),
            self.ring_buffer(iface),
            self.socket_rmem(),
            self.firewall(),
            self.network_manager(iface),
        ]
    }

    fn link_state(&self, iface: &str, link: &Result<LinkInfo, ToolError>) -> TunableCheck {
        let remediation = format!("ip link set dev {} up", iface);
        match link {
            Ok(link) if link.admin_up && !link.carrier => TunableCheck::warn(
                LINK_STATE,
                "up (no carrier)",
                "up",
                format!("check the cable on {} and the camera's power supply", iface),
            ),
            Ok(link) => TunableCheck::compare(
                LINK_STATE,
                if link.admin_up { "up" } else { "down" },
                "up",
                link.admin_up,
                remediation,
            ),
            Err(e) => TunableCheck::from_error(LINK_STATE, "up", e, remediation),
        }
    }

    fn ipv4_link_local(&self, iface: &str) -> TunableCheck {
        let range = link_local_range();
        let target = format!("address in {}", range);
        let remediation = format!("ip addr add {} dev {}", self.targets.host, iface);
        match IpTool::new(self.cmd).addresses(iface) {
            Ok(addrs) => {
                let current = if addrs.is_empty() {
                    "none".to_string()
                } else {
                    addrs
                        .iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let meets = addrs.iter().any(|a| range.contains(&a.addr()));
                TunableCheck::compare(IPV4_LINK_LOCAL, current, target, meets, remediation)
            }
            Err(e) => TunableCheck::from_error(IPV4_LINK_LOCAL, target, &e, remediation),
        }
    }

    fn mtu(&self, iface: &str, link: &Result<LinkInfo, ToolError>) -> TunableCheck {
        let target = self.targets.mtu.to_string();
        let remediation = format!("ip link set dev {} mtu {}", iface, self.targets.mtu);
        match link {
            Ok(link) => TunableCheck::compare(
                MTU,
                link.mtu.to_string(),
                target,
                link.mtu == self.targets.mtu,
                remediation,
            ),
            Err(e) => TunableCheck::from_error(MTU, target, e, remediation),
        }
    }

    fn rp_filter(&self, iface: &str) -> TunableCheck {
        let sysctl = Sysctl::new(self.cmd);
        let iface_key = rp_filter_key(iface);
        let target = format!("all=0, {}=0", iface);
        let remediation = format!(
            "sysctl -w {}=0 && sysctl -w {}=0",
            RP_FILTER_ALL, iface_key
        );

        let all = match sysctl.get(RP_FILTER_ALL) {
            Ok(v) => v,
            Err(e) => return TunableCheck::from_error(RP_FILTER, target, &e, remediation),
        };
        let scoped = match sysctl.get(&iface_key) {
            Ok(v) => v,
            Err(e) => return TunableCheck::from_error(RP_FILTER, target, &e, remediation),
        };

        TunableCheck::compare(
            RP_FILTER,
            format!("all={}, {}={}", all, iface, scoped),
            target,
            all == 0 && scoped == 0,
            remediation,
        )
    }

    fn ring_buffer(&self, iface: &str) -> TunableCheck {
        match Ethtool::new(self.cmd).ring(iface) {
            Ok(ring) => TunableCheck::compare(
                RING_BUFFER,
                format!("rx {} (max {})", ring.rx_current, ring.rx_max),
                format!("rx {}", ring.rx_max),
                ring.at_max(),
                format!("ethtool -G {} rx {}", iface, ring.rx_max),
            ),
            // Drivers without ring control answer with an error; nothing to fix.
            Err(ToolError::Failed { detail, .. }) => TunableCheck::warn(
                RING_BUFFER,
                format!("unknown ({})", detail),
                "rx at maximum",
                format!("ethtool -g {}", iface),
            ),
            Err(e) => TunableCheck::from_error(RING_BUFFER, "rx at maximum", &e, "install ethtool"),
        }
    }

    fn socket_rmem(&self) -> TunableCheck {
        let sysctl = Sysctl::new(self.cmd);
        let target = format!(">= {}", self.targets.socket_buffer_min);
        let remediation = format!(
            "sysctl -w {}={} && sysctl -w {}={}",
            RMEM_DEFAULT,
            self.targets.socket_buffer_bytes,
            RMEM_MAX,
            self.targets.socket_buffer_bytes
        );

        let default = match sysctl.get(RMEM_DEFAULT) {
            Ok(v) => v,
            Err(e) => return TunableCheck::from_error(SOCKET_RMEM, target, &e, remediation),
        };
        let max = match sysctl.get(RMEM_MAX) {
            Ok(v) => v,
            Err(e) => return TunableCheck::from_error(SOCKET_RMEM, target, &e, remediation),
        };

        let min = self.targets.socket_buffer_min;
        TunableCheck::compare(
            SOCKET_RMEM,
            format!("default={}, max={}", default, max),
            target,
            default >= min && max >= min,
            remediation,
        )
    }

    fn firewall(&self) -> TunableCheck {
        let ufw = Ufw::new(self.cmd);
        let range = self.targets.firewall_range;
        let target = format!("allow udp from {}", range);
        let remediation = format!("ufw allow from {} to any proto udp && ufw reload", range);

        if !ufw.is_installed() {
            return TunableCheck::warn(
                FIREWALL,
                "no firewall manager",
                target,
                format!("ensure any host firewall accepts traffic from {}", range),
            );
        }

        match ufw.status() {
            Ok(status) if !status.active => {
                TunableCheck::compare(FIREWALL, "inactive", target, true, remediation)
            }
            Ok(status) => {
                let present = status.allows_udp_from(&range);
                TunableCheck::compare(
                    FIREWALL,
                    if present { "rule present" } else { "rule missing" },
                    target,
                    present,
                    remediation,
                )
            }
            Err(e) => TunableCheck::from_error(FIREWALL, target, &e, remediation),
        }
    }

    fn network_manager(&self, iface: &str) -> TunableCheck {
        let nm = NetworkManager::new(self.cmd);
        let target = format!("inactive or ignoring {}", iface);
        let remediation = format!("nmcli device set {} managed no", iface);

        match nm.is_active() {
            Ok(false) => return TunableCheck::compare(NETWORK_MANAGER, "inactive", target, true, ""),
            Ok(true) => {}
            Err(e) => return TunableCheck::from_error(NETWORK_MANAGER, target, &e, remediation),
        }

        match nm.device_state(iface) {
            Ok(Some(state)) if state == "unmanaged" => {
                return TunableCheck::compare(
                    NETWORK_MANAGER,
                    format!("active, {} unmanaged", iface),
                    target,
                    true,
                    "",
                );
            }
            Ok(_) => {}
            Err(e) => debug!("nmcli device query failed: {}", e),
        }

        let ignored = self
            .fs
            .read_to_string(self.nm_conf)
            .map(|text| config_ignores(&text, iface))
            .unwrap_or(false);
        TunableCheck::compare(
            NETWORK_MANAGER,
            if ignored {
                format!("active, {} listed in unmanaged-devices", iface)
            } else {
                format!("active, managing {}", iface)
            },
            target,
            ignored,
            remediation,
        )
    }
}
