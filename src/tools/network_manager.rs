//! NetworkManager adapter (`systemctl`, `nmcli`).

use super::{exec, exec_raw};
use crate::cmd_abstraction::CommandExecutor;
use crate::error::ToolError;

pub const SYSTEMCTL: &str = "systemctl";
pub const NMCLI: &str = "nmcli";
pub const SERVICE: &str = "NetworkManager";

pub struct NetworkManager<'a> {
    cmd: &'a dyn CommandExecutor,
}

impl<'a> NetworkManager<'a> {
    pub fn new(cmd: &'a dyn CommandExecutor) -> Self {
        Self { cmd }
    }

    /// `systemctl is-active` exits non-zero for anything but `active`, so the
    /// answer is read from stdout.
    pub fn is_active(&self) -> Result<bool, ToolError> {
        let out = exec_raw(self.cmd, SYSTEMCTL, &["is-active", SERVICE])?;
        Ok(out.stdout.trim() == "active")
    }

    /// Device state as reported by nmcli (`connected`, `unmanaged`, ...).
    pub fn device_state(&self, iface: &str) -> Result<Option<String>, ToolError> {
        let out = exec(self.cmd, NMCLI, &["-t", "-f", "DEVICE,STATE", "device", "status"])?;
        Ok(parse_device_state(&out, iface))
    }

    pub fn set_unmanaged(&self, iface: &str) -> Result<(), ToolError> {
        exec(self.cmd, NMCLI, &["device", "set", iface, "managed", "no"]).map(|_| ())
    }

    pub fn stop(&self) -> Result<(), ToolError> {
        exec(self.cmd, SYSTEMCTL, &["stop", SERVICE]).map(|_| ())
    }
}

/// Parse `nmcli -t -f DEVICE,STATE device status` (`eth0:unmanaged`).
pub fn parse_device_state(output: &str, iface: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (device, state) = line.trim().split_once(':')?;
        (device == iface).then(|| state.to_string())
    })
}

/// Whether NetworkManager config text already lists `iface` as unmanaged.
pub fn config_ignores(config: &str, iface: &str) -> bool {
    let wanted = format!("interface-name:{}", iface);
    config.lines().any(|line| {
        let line = line.trim();
        !line.starts_with('#')
            && line
                .strip_prefix("unmanaged-devices=")
                .map(|v| v.split(';').any(|d| d.trim() == wanted))
                .unwrap_or(false)
    })
}
