//! Active sweep (`arp-scan`) and vendor discovery tool adapters.
//!
//! Both tools print one device per line with an IPv4 address and a MAC
//! somewhere on it; [`parse_address_pairs`] extracts those pairs without
//! depending on column positions.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use super::exec;
use crate::cmd_abstraction::CommandExecutor;
use crate::config::VendorToolConfig;
use crate::error::ToolError;
use crate::mac::MacAddr;

pub const ARP_SCAN: &str = "arp-scan";

/// A device line from a scanner: MAC plus the first IPv4 on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedDevice {
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
}

pub struct ArpScan<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> ArpScan<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    pub fn sweep(&self, iface: &str, range: &Ipv4Net) -> Result<Vec<ScannedDevice>, ToolError> {
        let iface_arg = format!("--interface={}", iface);
        let range = range.to_string();
        let out = exec(
            self.cmd,
            ARP_SCAN,
            &[
                &iface_arg,
                "--quiet",
                "--retry=1",
                "--bandwidth=8M",
                &range,
            ],
        )?;
        Ok(parse_address_pairs(&out))
    }
}

pub struct VendorTool<'a> {
    cmd: &'a dyn CommandExecutor,
    config: &'a VendorToolConfig,
}

impl<'a> VendorTool<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor, config: &'a VendorToolConfig) -> Self {
        Self { cmd, config }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    pub fn list(&self) -> Result<Vec<ScannedDevice>, ToolError> {
        let args: Vec<&str> = self.config.args.iter().map(String::as_str).collect();
        let out = exec(self.cmd, &self.config.program, &args)?;
        Ok(parse_address_pairs(&out))
    }
}

/// Extract MAC/IPv4 pairs, one per line. Lines without a MAC are ignored;
/// the netmask and gateway columns some tools print come after the device
/// address, so the first IPv4 on the line wins.
pub fn parse_address_pairs(output: &str) -> Vec<ScannedDevice> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
                .filter(|t| !t.is_empty())
                .collect();
            let mac = tokens.iter().find_map(|t| t.parse::<MacAddr>().ok())?;
            let ip = tokens.iter().find_map(|t| {
                t.trim_matches(|c: char| c == '(' || c == ')')
                    .parse::<Ipv4Addr>()
                    .ok()
            });
            Some(ScannedDevice { mac, ip })
        })
        .collect()
}
