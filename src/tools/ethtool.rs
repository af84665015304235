//! `ethtool` adapter: NIC RX ring buffer size.

use serde::Serialize;

use super::exec;
use crate::cmd_abstraction::CommandExecutor;
use crate::error::ToolError;

pub const ETHTOOL: &str = "ethtool";

/// RX ring sizes from `ethtool -g`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingParams {
    pub rx_max: u32,
    pub rx_current: u32,
}

impl RingParams {
    pub fn at_max(&self) -> bool {
        self.rx_current >= self.rx_max
    }
}

pub struct Ethtool<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> Ethtool<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    pub fn ring(&self, iface: &str) -> Result<RingParams, ToolError> {
        let out = exec(self.cmd, ETHTOOL, &["-g", iface])?;
        parse_ring(&out).ok_or_else(|| ToolError::Parse {
            tool: ETHTOOL.to_string(),
            detail: format!("no RX ring sizes reported for {}", iface),
        })
    }

    pub fn set_rx(&self, iface: &str, rx: u32) -> Result<(), ToolError> {
        let rx = rx.to_string();
        exec(self.cmd, ETHTOOL, &["-G", iface, "rx", &rx]).map(|_| ())
    }
}

/// Parse `ethtool -g` output:
///
/// ```text
/// Ring parameters for eth0:
/// Pre-set maximums:
/// RX:             4096
/// ...
/// Current hardware settings:
/// RX:             256
/// ```
pub fn parse_ring(output: &str) -> Option<RingParams> {
    #[derive(Clone, Copy)]
    enum Section {
        None,
        Max,
        Current,
    }

    let mut section = Section::None;
    let mut rx_max = None;
    let mut rx_current = None;

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("Pre-set maximums") {
            section = Section::Max;
            continue;
        }
        if line.starts_with("Current hardware settings") {
            section = Section::Current;
            continue;
        }
        let Some(value) = line.strip_prefix("RX:") else {
            continue;
        };
        let value = value.trim().parse::<u32>().ok();
        match section {
            Section::Max => rx_max = rx_max.or(value),
            Section::Current => rx_current = rx_current.or(value),
            Section::None => {}
        }
    }

    Some(RingParams {
        rx_max: rx_max?,
        rx_current: rx_current?,
    })
}
