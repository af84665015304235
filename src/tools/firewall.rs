//! `ufw` adapter: allow rules for the camera segment.

use ipnet::Ipv4Net;

use super::exec;
use crate::cmd_abstraction::CommandExecutor;
use crate::error::ToolError;

pub const UFW: &str = "ufw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallStatus {
    pub active: bool,
    /// Rule lines below the header, verbatim
    pub rules: Vec<String>,
}

impl FirewallStatus {
    /// Whether the broad `from <source> to any proto udp` rule, or an
    /// all-protocol rule from `source`, is present.
    pub fn allows_udp_from(&self, source: &Ipv4Net) -> bool {
        self.allows_all_from(source)
            || self.allow_rules_from(source).any(|tokens| {
                tokens.first().map_or(false, |t| t.starts_with("Anywhere"))
                    && tokens.iter().any(|t| t.ends_with("/udp"))
            })
    }

    /// Whether `from <source> to any port <port> proto tcp`, or an
    /// all-protocol rule from `source`, is present.
    pub fn allows_tcp_port_from(&self, source: &Ipv4Net, port: u16) -> bool {
        let wanted = format!("{}/tcp", port);
        self.allows_all_from(source)
            || self
                .allow_rules_from(source)
                .any(|tokens| tokens.first() == Some(&wanted.as_str()))
    }

    /// `ufw allow from <source>`: listed as `Anywhere ALLOW <source>` with no
    /// protocol suffix on either side.
    pub fn allows_all_from(&self, source: &Ipv4Net) -> bool {
        let exact = source.to_string();
        self.allow_rules_from(source).any(|tokens| {
            tokens.first() == Some(&"Anywhere") && tokens.iter().any(|t| *t == exact)
        })
    }

    fn allow_rules_from<'s>(
        &'s self,
        source: &Ipv4Net,
    ) -> impl Iterator<Item = Vec<&'s str>> + 's {
        let source = source.to_string();
        self.rules
            .iter()
            .map(|r| r.split_whitespace().collect::<Vec<_>>())
            .filter(move |tokens| {
                tokens.contains(&"ALLOW") && tokens.iter().any(|t| t.starts_with(&source))
            })
    }
}

pub struct Ufw<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> Ufw<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    pub fn is_installed(&self) -> bool {
        self.cmd.is_available(UFW)
    }

    pub fn status(&self) -> Result<FirewallStatus, ToolError> {
        let out = exec(self.cmd, UFW, &["status"])?;
        parse_status(&out).ok_or_else(|| ToolError::Parse {
            tool: UFW.to_string(),
            detail: "missing 'Status:' line".to_string(),
        })
    }

    /// `ufw allow from <range> to any proto udp`
    pub fn allow_udp_from(&self, source: &Ipv4Net) -> Result<(), ToolError> {
        let source = source.to_string();
        exec(
            self.cmd,
            UFW,
            &["allow", "from", &source, "to", "any", "proto", "udp"],
        )
        .map(|_| ())
    }

    /// `ufw allow from <range> to any port <port> proto tcp`
    pub fn allow_tcp_port_from(&self, source: &Ipv4Net, port: u16) -> Result<(), ToolError> {
        let source = source.to_string();
        let port = port.to_string();
        exec(
            self.cmd,
            UFW,
            &["allow", "from", &source, "to", "any", "port", &port, "proto", "tcp"],
        )
        .map(|_| ())
    }

    pub fn reload(&self) -> Result<(), ToolError> {
        exec(self.cmd, UFW, &["reload"]).map(|_| ())
    }
}

/// Parse `ufw status`:
///
/// ```text
/// Status: active
///
/// To                         Action      From
/// --                         ------      ----
/// Anywhere/udp               ALLOW       169.254.0.0/16/udp
/// ```
pub fn parse_status(output: &str) -> Option<FirewallStatus> {
    let mut lines = output.lines();
    let status_line = lines.find(|l| l.trim_start().starts_with("Status:"))?;
    let active = status_line
        .trim_start()
        .trim_start_matches("Status:")
        .trim()
        .eq_ignore_ascii_case("active");

    let rules = lines
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("To ") && !l.starts_with("--"))
        .map(String::from)
        .collect();

    Some(FirewallStatus { active, rules })
}
