//! `sysctl` adapter: kernel parameter get/set.

use super::exec;
use crate::cmd_abstraction::CommandExecutor;
use crate::error::ToolError;

pub const SYSCTL: &str = "sysctl";

pub const RMEM_DEFAULT: &str = "net.core.rmem_default";
pub const RMEM_MAX: &str = "net.core.rmem_max";
pub const RP_FILTER_ALL: &str = "net.ipv4.conf.all.rp_filter";

/// Per-interface reverse-path-filter key.
pub fn rp_filter_key(scope: &str) -> String {
    format!("net.ipv4.conf.{}.rp_filter", scope)
}

pub struct Sysctl<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> Sysctl<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    pub fn get(&self, key: &str) -> Result<u64, ToolError> {
        let out = exec(self.cmd, SYSCTL, &["-n", key])?;
        parse_value(&out).ok_or_else(|| ToolError::Parse {
            tool: SYSCTL.to_string(),
            detail: format!("{} = {:?}", key, out.trim()),
        })
    }

    pub fn set(&self, key: &str, value: u64) -> Result<(), ToolError> {
        let assignment = format!("{}={}", key, value);
        exec(self.cmd, SYSCTL, &["-w", &assignment]).map(|_| ())
    }
}

/// Values like `tcp_rmem` are tab-separated triples; the first field is used.
pub fn parse_value(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}
