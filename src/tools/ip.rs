//! `ip` (iproute2) adapter: link state, MTU, IPv4 addresses, neighbors.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use super::exec;
use crate::cmd_abstraction::CommandExecutor;
use crate::error::ToolError;
use crate::mac::MacAddr;

pub const IP: &str = "ip";

/// Link-layer state reported by `ip -o link show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// `UP` flag: administratively up
    pub admin_up: bool,
    /// `LOWER_UP` flag: carrier present
    pub carrier: bool,
    pub mtu: u32,
    pub mac: Option<MacAddr>,
}

pub struct IpTool<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> IpTool<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    pub fn link(&self, iface: &str) -> Result<LinkInfo, ToolError> {
        let out = exec(self.cmd, IP, &["-o", "link", "show", "dev", iface])?;
        parse_link(&out).ok_or_else(|| ToolError::Parse {
            tool: IP.to_string(),
            detail: format!("unexpected link output for {}", iface),
        })
    }

    pub fn addresses(&self, iface: &str) -> Result<Vec<Ipv4Net>, ToolError> {
        let out = exec(self.cmd, IP, &["-4", "-o", "addr", "show", "dev", iface])?;
        Ok(parse_addresses(&out))
    }

    pub fn neighbors(&self, iface: &str) -> Result<Vec<(Ipv4Addr, MacAddr)>, ToolError> {
        let out = exec(self.cmd, IP, &["-4", "neigh", "show", "dev", iface])?;
        Ok(parse_neighbors(&out))
    }

    pub fn set_up(&self, iface: &str) -> Result<(), ToolError> {
        exec(self.cmd, IP, &["link", "set", "dev", iface, "up"]).map(|_| ())
    }

    pub fn set_mtu(&self, iface: &str, mtu: u32) -> Result<(), ToolError> {
        let mtu = mtu.to_string();
        exec(self.cmd, IP, &["link", "set", "dev", iface, "mtu", &mtu]).map(|_| ())
    }

    pub fn flush_ipv4(&self, iface: &str) -> Result<(), ToolError> {
        exec(self.cmd, IP, &["-4", "addr", "flush", "dev", iface]).map(|_| ())
    }

    pub fn add_address(&self, iface: &str, addr: Ipv4Net) -> Result<(), ToolError> {
        let addr = addr.to_string();
        exec(self.cmd, IP, &["addr", "add", &addr, "dev", iface]).map(|_| ())
    }
}

/// Parse one `ip -o link show` record:
///
/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc mq state UP ... link/ether 1c:0f:af:00:00:01 brd ...`
pub fn parse_link(output: &str) -> Option<LinkInfo> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;

    let flags_start = line.find('<')?;
    let flags_end = line[flags_start..].find('>')? + flags_start;
    let flags: Vec<&str> = line[flags_start + 1..flags_end].split(',').collect();

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mtu = value_after(&tokens, "mtu")?.parse().ok()?;
    let mac = value_after(&tokens, "link/ether").and_then(|m| m.parse().ok());

    Some(LinkInfo {
        admin_up: flags.contains(&"UP"),
        carrier: flags.contains(&"LOWER_UP"),
        mtu,
        mac,
    })
}

/// Parse `ip -4 -o addr show` output into the assigned networks.
pub fn parse_addresses(output: &str) -> Vec<Ipv4Net> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            value_after(&tokens, "inet").and_then(|a| a.parse().ok())
        })
        .collect()
}

/// Parse `ip -4 neigh show` output. Entries without a hardware address
/// (`INCOMPLETE`, `FAILED`) are skipped.
pub fn parse_neighbors(output: &str) -> Vec<(Ipv4Addr, MacAddr)> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let ip = tokens.first()?.parse().ok()?;
            let mac = value_after(&tokens, "lladdr")?.parse().ok()?;
            Some((ip, mac))
        })
        .collect()
}

fn value_after<'t>(tokens: &[&'t str], key: &str) -> Option<&'t str> {
    tokens
        .iter()
        .position(|t| *t == key)
        .and_then(|i| tokens.get(i + 1))
        .copied()
}
