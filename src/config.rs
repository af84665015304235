//! Configuration management for gigelink.
//!
//! Every target value the orchestrator drives toward (addresses, MTU,
//! buffer sizes, firewall range, file locations) lives here so nothing is
//! baked into the probing or applying logic.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::mac::VendorPrefix;

/// The IPv4 link-local block (RFC 3927).
pub const LINK_LOCAL_RANGE: &str = "169.254.0.0/16";

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gigelink/config.yaml";

const MIN_MTU: u32 = 576;
const MAX_MTU: u32 = 9216;

pub fn link_local_range() -> Ipv4Net {
    let base = Ipv4Addr::new(169, 254, 0, 0);
    Ipv4Net::new(base, 16).unwrap_or_else(|_| Ipv4Net::from(base))
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Force a specific interface instead of auto-selection
    pub interface: Option<String>,

    /// Exact interface names tried before pattern matching
    pub preferred_interfaces: Vec<String>,

    /// Link-local address assigned to the host side
    pub host_address: Ipv4Addr,

    /// Expected camera address (advisory, used only in reporting)
    pub camera_address: Ipv4Addr,

    /// Subnet mask for the host address
    pub netmask: Ipv4Addr,

    /// Target MTU (jumbo frames)
    pub mtu: u32,

    /// Minimum acceptable rmem_default / rmem_max
    pub socket_buffer_min: u64,

    /// Value written when the socket buffers are below the minimum
    pub socket_buffer_bytes: u64,

    pub firewall: FirewallConfig,

    pub discovery: DiscoveryConfig,

    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            preferred_interfaces: vec![
                "eth0".to_string(),
                "enp0s31f6".to_string(),
                "eno1".to_string(),
                "enp1s0".to_string(),
                "end0".to_string(),
            ],
            host_address: Ipv4Addr::new(169, 254, 1, 1),
            camera_address: Ipv4Addr::new(169, 254, 1, 2),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
            mtu: 9000,
            socket_buffer_min: 1_048_576,
            socket_buffer_bytes: 26_214_400,
            firewall: FirewallConfig::default(),
            discovery: DiscoveryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Source range allowed through the host firewall
    pub source_range: Ipv4Net,

    /// Extra TCP ports opened for the source range
    pub tcp_ports: Vec<u16>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            source_range: link_local_range(),
            tcp_ports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// MAC prefixes identifying the camera vendor
    pub vendor_prefixes: Vec<String>,

    /// Total wait for the camera to appear (cameras boot in ~20-30s)
    pub timeout_secs: u64,

    /// Delay between discovery passes
    pub poll_interval_secs: u64,

    /// Range swept by the active scan
    pub sweep_range: Ipv4Net,

    /// Vendor discovery binary, if installed
    pub vendor_tool: Option<VendorToolConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            vendor_prefixes: vec!["1C:0F:AF".to_string()],
            timeout_secs: 30,
            poll_interval_secs: 2,
            sweep_range: link_local_range(),
            vendor_tool: Some(VendorToolConfig::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorToolConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for VendorToolConfig {
    fn default() -> Self {
        Self {
            program: "IpConfigUtility".to_string(),
            args: vec!["/list".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding per-interface static stanzas
    pub interfaces_dir: PathBuf,

    /// System sysctl file that receives persisted values
    pub sysctl_conf: PathBuf,

    /// Security-hardening sysctl file whose rp_filter lines get commented out
    pub hardening_sysctl: PathBuf,

    /// NetworkManager main configuration file
    pub network_manager_conf: PathBuf,

    /// Directory for the per-interface run lock
    pub lock_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            interfaces_dir: PathBuf::from("/etc/network/interfaces.d"),
            sysctl_conf: PathBuf::from("/etc/sysctl.conf"),
            hardening_sysctl: PathBuf::from("/etc/sysctl.d/10-network-security.conf"),
            network_manager_conf: PathBuf::from("/etc/NetworkManager/NetworkManager.conf"),
            lock_dir: PathBuf::from("/run"),
        }
    }
}

/// Command-line / environment overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interface: Option<String>,
    pub host_address: Option<Ipv4Addr>,
    pub camera_address: Option<Ipv4Addr>,
    pub mtu: Option<u32>,
}

/// The resolved set of values the probe compares against and the applier
/// drives toward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    /// Host address with prefix, e.g. 169.254.1.1/16
    pub host: Ipv4Net,
    pub mtu: u32,
    pub socket_buffer_min: u64,
    pub socket_buffer_bytes: u64,
    pub firewall_range: Ipv4Net,
    pub tcp_ports: Vec<u16>,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file when it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            debug!(
                "Config file {:?} not found, using built-in defaults",
                path.as_ref()
            );
            Ok(Self::default())
        }
    }

    /// Apply CLI/environment overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(ref iface) = overrides.interface {
            self.interface = Some(iface.clone());
        }
        if let Some(addr) = overrides.host_address {
            self.host_address = addr;
        }
        if let Some(addr) = overrides.camera_address {
            self.camera_address = addr;
        }
        if let Some(mtu) = overrides.mtu {
            self.mtu = mtu;
        }
        self.validate()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let range = link_local_range();

        if !range.contains(&self.host_address) {
            anyhow::bail!(
                "host_address {} is outside the link-local range {}",
                self.host_address,
                LINK_LOCAL_RANGE
            );
        }

        if !range.contains(&self.camera_address) {
            anyhow::bail!(
                "camera_address {} is outside the link-local range {}",
                self.camera_address,
                LINK_LOCAL_RANGE
            );
        }

        if self.host_address == self.camera_address {
            anyhow::bail!("host_address and camera_address must differ");
        }

        self.prefix_len()?;

        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            anyhow::bail!(
                "Invalid mtu {}. Must be between {} and {}",
                self.mtu,
                MIN_MTU,
                MAX_MTU
            );
        }

        if self.socket_buffer_bytes < self.socket_buffer_min {
            anyhow::bail!(
                "socket_buffer_bytes ({}) must be at least socket_buffer_min ({})",
                self.socket_buffer_bytes,
                self.socket_buffer_min
            );
        }

        if self.discovery.poll_interval_secs == 0 {
            anyhow::bail!("discovery.poll_interval_secs must be greater than zero");
        }

        if self.discovery.vendor_prefixes.is_empty() {
            anyhow::bail!("discovery.vendor_prefixes must name at least one prefix");
        }
        self.vendor_prefixes()?;

        if let Some(ref iface) = self.interface {
            validate_interface_name(iface)?;
        }

        Ok(())
    }

    /// Prefix length derived from the netmask.
    pub fn prefix_len(&self) -> Result<u8> {
        ipnet::ipv4_mask_to_prefix(self.netmask)
            .map_err(|_| anyhow::anyhow!("Invalid netmask {}: not contiguous", self.netmask))
    }

    /// Parsed vendor prefixes.
    pub fn vendor_prefixes(&self) -> Result<Vec<VendorPrefix>> {
        self.discovery
            .vendor_prefixes
            .iter()
            .map(|p| p.parse::<VendorPrefix>().map_err(|e| anyhow::anyhow!(e)))
            .collect()
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.poll_interval_secs)
    }

    /// Resolve the target set. Call after [`Config::validate`].
    pub fn targets(&self) -> Result<TargetSet> {
        let host = Ipv4Net::new(self.host_address, self.prefix_len()?)
            .context("Invalid host address/prefix")?;
        Ok(TargetSet {
            host,
            mtu: self.mtu,
            socket_buffer_min: self.socket_buffer_min,
            socket_buffer_bytes: self.socket_buffer_bytes,
            firewall_range: self.firewall.source_range,
            tcp_ports: self.firewall.tcp_ports.clone(),
        })
    }
}

/// Interface names end up in command arguments and file names.
pub fn validate_interface_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 15
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        anyhow::bail!("Invalid interface name '{}'", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.prefix_len().unwrap(), 16);
        assert_eq!(config.vendor_prefixes().unwrap().len(), 1);
    }

    #[test]
    fn test_targets() {
        let targets = Config::default().targets().unwrap();
        assert_eq!(targets.host.to_string(), "169.254.1.1/16");
        assert_eq!(targets.mtu, 9000);
        assert_eq!(targets.firewall_range.to_string(), LINK_LOCAL_RANGE);
        assert!(targets.socket_buffer_bytes >= targets.socket_buffer_min);
    }

    #[test]
    fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host_address: 169.254.10.1\ncamera_address: 169.254.10.2\ndiscovery:\n  timeout_secs: 5\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.host_address, Ipv4Addr::new(169, 254, 10, 1));
        assert_eq!(config.discovery.timeout_secs, 5);
        assert_eq!(config.discovery.poll_interval_secs, 2);
        assert_eq!(config.mtu, 9000);
        assert_eq!(config.discovery.vendor_prefixes, vec!["1C:0F:AF"]);
    }

    #[test]
    fn test_load_vendor_tool_and_paths() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "discovery:\n  vendor_tool:\n    program: /opt/sdk/bin/discover\n    args: [\"--list\"]\npaths:\n  lock_dir: /tmp\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.discovery.vendor_tool,
            Some(VendorToolConfig {
                program: "/opt/sdk/bin/discover".to_string(),
                args: vec!["--list".to_string()],
            })
        );
        assert_eq!(config.paths.lock_dir, PathBuf::from("/tmp"));
        assert_eq!(config.paths.sysctl_conf, PathBuf::from("/etc/sysctl.conf"));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "mtu: [not a number").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/gigelink.yaml").unwrap();
        assert_eq!(config.mtu, 9000);
    }

    #[test]
    fn test_validate_rejects_routable_host_address() {
        let config = Config {
            host_address: Ipv4Addr::new(192, 168, 1, 10),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_same_addresses() {
        let config = Config {
            camera_address: Ipv4Addr::new(169, 254, 1, 1),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_netmask() {
        let config = Config {
            netmask: Ipv4Addr::new(255, 0, 255, 0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_mtu_bounds() {
        for (mtu, ok) in [(575, false), (576, true), (1500, true), (9216, true), (9217, false)] {
            let config = Config {
                mtu,
                ..Config::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "mtu {}", mtu);
        }
    }

    #[test]
    fn test_validate_socket_buffer_order() {
        let config = Config {
            socket_buffer_min: 2_000_000,
            socket_buffer_bytes: 1_000_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_discovery() {
        let mut config = Config::default();
        config.discovery.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.vendor_prefixes = vec!["not-a-prefix".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.vendor_prefixes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(&Overrides {
                interface: Some("enp3s0".to_string()),
                host_address: Some(Ipv4Addr::new(169, 254, 7, 1)),
                camera_address: None,
                mtu: Some(8000),
            })
            .unwrap();
        assert_eq!(config.interface.as_deref(), Some("enp3s0"));
        assert_eq!(config.host_address, Ipv4Addr::new(169, 254, 7, 1));
        assert_eq!(config.mtu, 8000);
    }

    #[test]
    fn test_apply_overrides_revalidates() {
        let mut config = Config::default();
        let result = config.apply_overrides(&Overrides {
            mtu: Some(100_000),
            ..Overrides::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_interface_name() {
        assert!(validate_interface_name("eth0").is_ok());
        assert!(validate_interface_name("enp0s31f6").is_ok());
        assert!(validate_interface_name("eth0.100").is_ok());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("eth0; reboot").is_err());
        assert!(validate_interface_name("../../etc/passwd").is_err());
        assert!(validate_interface_name("averyveryverylongname").is_err());
    }
}
