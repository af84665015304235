//! Network interface enumeration, classification and selection.
//!
//! Selection is deterministic: a forced name wins, then an exact-name fast
//! path over the preferred list, then the first (sorted) name that follows a
//! wired naming convention. A sysfs capability check guards against picking
//! a wireless link that happens to carry a wired-looking name.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::cmd_abstraction::CommandExecutor;
use crate::error::SetupError;
use crate::fs_abstraction::FileSystem;
use crate::tools::ethtool::{Ethtool, RingParams};
use crate::tools::ip::IpTool;

pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Kind of network interface, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Physical ethernet interface (eth*, en*)
    Wired,
    /// Wireless interface
    Wireless,
    /// Loopback interface
    Loopback,
    /// Bridges, tunnels, container and VLAN interfaces
    Virtual,
    /// Unknown naming scheme
    Unknown,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Wired => "wired",
            InterfaceKind::Wireless => "wireless",
            InterfaceKind::Loopback => "loopback",
            InterfaceKind::Virtual => "virtual",
            InterfaceKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An enumerated interface before it is queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCandidate {
    pub name: String,
    pub kind: InterfaceKind,
}

/// The interface selected for this run, with its current state.
///
/// Rebuilt from the host on every run; only the effects applied to it are
/// ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub kind: InterfaceKind,
    pub link_up: bool,
    pub carrier: bool,
    pub mtu: Option<u32>,
    pub addresses: Vec<Ipv4Net>,
    pub ring: Option<RingParams>,
}

impl NetworkInterface {
    pub fn is_wireless(&self) -> bool {
        self.kind == InterfaceKind::Wireless
    }
}

/// Classify an interface by its name (same conventions as systemd/udev
/// predictable names plus the legacy `ethN`).
pub fn classify(name: &str) -> InterfaceKind {
    if name == "lo" {
        return InterfaceKind::Loopback;
    }

    if name.starts_with("wl") || name.starts_with("wifi") || name.starts_with("ath") {
        return InterfaceKind::Wireless;
    }

    if name == "docker0"
        || name.starts_with("br")
        || name.starts_with("virbr")
        || name.starts_with("veth")
        || name.starts_with("tun")
        || name.starts_with("tap")
        || name.starts_with("wg")
        || name.starts_with("vlan")
        || name.starts_with("bond")
        || name.starts_with("incus")
        || name.starts_with("lxd")
        || name.contains('.')
        || name.contains('@')
    {
        return InterfaceKind::Virtual;
    }

    if name.starts_with("eth") || name.starts_with("en") {
        return InterfaceKind::Wired;
    }

    InterfaceKind::Unknown
}

pub struct InterfaceSelector<'a> {
    cmd: &'a dyn CommandExecutor,
    fs: &'a dyn FileSystem,
    preferred: &'a [String],
    forced: Option<&'a str>,
}

impl<'a> InterfaceSelector<'a> {
    pub fn new(
        cmd: &'a dyn CommandExecutor,
        fs: &'a dyn FileSystem,
        preferred: &'a [String],
        forced: Option<&'a str>,
    ) -> Self {
        Self {
            cmd,
            fs,
            preferred,
            forced,
        }
    }

    /// Enumerate `/sys/class/net`, sorted by name.
    pub fn candidates(&self) -> Vec<InterfaceCandidate> {
        let mut names = match self.fs.list_dir(Path::new(SYS_CLASS_NET)) {
            Ok(names) => names,
            Err(e) => {
                warn!("Cannot enumerate {}: {}", SYS_CLASS_NET, e);
                Vec::new()
            }
        };
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let mut kind = classify(&name);
                if kind != InterfaceKind::Loopback && self.has_wireless_capability(&name) {
                    kind = InterfaceKind::Wireless;
                }
                InterfaceCandidate { name, kind }
            })
            .collect()
    }

    /// Pick the interface name without querying its state.
    pub fn choose(&self) -> Result<String, SetupError> {
        let names: Vec<String> = match self.fs.list_dir(Path::new(SYS_CLASS_NET)) {
            Ok(mut names) => {
                names.sort();
                names
            }
            Err(e) => {
                warn!("Cannot enumerate {}: {}", SYS_CLASS_NET, e);
                Vec::new()
            }
        };

        if let Some(forced) = self.forced {
            if names.iter().any(|n| n == forced) {
                debug!("Using configured interface {}", forced);
                return Ok(forced.to_string());
            }
            return Err(SetupError::InterfaceNotFound(forced.to_string()));
        }

        if let Some(name) = self
            .preferred
            .iter()
            .find(|p| names.contains(p) && classify(p) != InterfaceKind::Loopback)
        {
            debug!("Selected preferred interface {}", name);
            return Ok(name.clone());
        }

        names
            .into_iter()
            .find(|n| classify(n) == InterfaceKind::Wired && !self.has_wireless_capability(n))
            .map(|n| {
                debug!("Selected first wired interface {}", n);
                n
            })
            .ok_or(SetupError::NoInterfaceFound)
    }

    /// Select an interface and read its current state.
    pub fn select(&self) -> Result<NetworkInterface, SetupError> {
        let name = self.choose()?;
        let mut iface = self.inspect(&name);
        if self.has_wireless_capability(&name) {
            warn!(
                "{} reports wireless capability; configuring it may disrupt your primary network link",
                name
            );
            iface.kind = InterfaceKind::Wireless;
        }
        Ok(iface)
    }

    /// Read link, address and ring state for `name`. Query failures leave
    /// the corresponding fields empty; the probe reports them per check.
    pub fn inspect(&self, name: &str) -> NetworkInterface {
        let ip = IpTool::new(self.cmd);
        let link = ip
            .link(name)
            .map_err(|e| debug!("link query for {} failed: {}", name, e))
            .ok();
        let addresses = ip.addresses(name).unwrap_or_default();
        let ring = Ethtool::new(self.cmd).ring(name).ok();

        NetworkInterface {
            name: name.to_string(),
            kind: classify(name),
            link_up: link.as_ref().map(|l| l.admin_up).unwrap_or(false),
            carrier: link.as_ref().map(|l| l.carrier).unwrap_or(false),
            mtu: link.map(|l| l.mtu),
            addresses,
            ring,
        }
    }

    fn has_wireless_capability(&self, name: &str) -> bool {
        let base = Path::new(SYS_CLASS_NET).join(name);
        self.fs.exists(&base.join("wireless")) || self.fs.exists(&base.join("phy80211"))
    }
}

/// Format the enumeration for the `interfaces` command.
pub fn format_candidates(candidates: &[InterfaceCandidate], selected: Option<&str>) -> String {
    let mut output = String::new();
    output.push_str(&format!("{:<3}{:<16} {}\n", "", "Interface", "Kind"));
    output.push_str(&format!("{:<3}{:<16} {}\n", "", "-".repeat(16), "-".repeat(10)));
    for c in candidates {
        let marker = if Some(c.name.as_str()) == selected { "*" } else { "" };
        output.push_str(&format!("{:<3}{:<16} {}\n", marker, c.name, c.kind));
    }
    output
}
