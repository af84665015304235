//! On-disk configuration so the camera link survives a reboot.
//!
//! Four independent artifacts, each rewritten only when its content would
//! change:
//!
//! | Artifact | Effect |
//! |---|---|
//! | `<interfaces_dir>/<iface>` | static stanza: address, netmask, MTU, ring size |
//! | `<sysctl_conf>` | socket buffer and rp_filter lines appended if absent |
//! | `<hardening_sysctl>` | conflicting rp_filter lines commented out |
//! | `<network_manager_conf>` | `unmanaged-devices=interface-name:<iface>` under `[keyfile]` |
//!
//! A failure on one artifact is recorded and the others are still written.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{PathsConfig, TargetSet};
use crate::fs_abstraction::{write_atomic, FileSystem};
use crate::tools::network_manager::config_ignores;
use crate::tools::sysctl::{rp_filter_key, RMEM_DEFAULT, RMEM_MAX, RP_FILTER_ALL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    InterfaceStanza,
    SysctlConf,
    HardeningSysctl,
    NetworkManagerConf,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::InterfaceStanza => write!(f, "interface stanza"),
            Artifact::SysctlConf => write!(f, "sysctl.conf"),
            Artifact::HardeningSysctl => write!(f, "hardening sysctl"),
            Artifact::NetworkManagerConf => write!(f, "NetworkManager.conf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Written,
    Unchanged,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactOutcome {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub status: ArtifactStatus,
}

impl ArtifactOutcome {
    fn new(artifact: Artifact, path: &Path, result: io::Result<ArtifactStatus>) -> Self {
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to persist {} to {}: {}", artifact, path.display(), e);
                ArtifactStatus::Failed(e.to_string())
            }
        };
        if status == ArtifactStatus::Written {
            info!("Persisted {} to {}", artifact, path.display());
        }
        Self {
            artifact,
            path: path.to_path_buf(),
            status,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ArtifactStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistReport {
    pub outcomes: Vec<ArtifactOutcome>,
}

impl PersistReport {
    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

pub struct PersistenceWriter<'a> {
    fs: &'a dyn FileSystem,
    paths: &'a PathsConfig,
}

impl<'a> PersistenceWriter<'a> {
    pub fn new(fs: &'a dyn FileSystem, paths: &'a PathsConfig) -> Self {
        Self { fs, paths }
    }

    /// Write every artifact. `ring_max` adds the boot-time ring command to
    /// the stanza when the NIC reported one.
    pub fn persist(&self, iface: &str, targets: &TargetSet, ring_max: Option<u32>) -> PersistReport {
        PersistReport {
            outcomes: vec![
                self.interface_stanza(iface, targets, ring_max),
                self.sysctl_conf(iface, targets),
                self.hardening_sysctl(iface),
                self.network_manager_conf(iface),
            ],
        }
    }

    pub fn interface_stanza(
        &self,
        iface: &str,
        targets: &TargetSet,
        ring_max: Option<u32>,
    ) -> ArtifactOutcome {
        let path = self.paths.interfaces_dir.join(iface);
        let rendered = render_stanza(iface, targets, ring_max);
        let result = match self.fs.read_to_string(&path) {
            Ok(existing) if existing == rendered => Ok(ArtifactStatus::Unchanged),
            Ok(_) => write_atomic(self.fs, &path, &rendered).map(|_| ArtifactStatus::Written),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                write_atomic(self.fs, &path, &rendered).map(|_| ArtifactStatus::Written)
            }
            Err(e) => Err(e),
        };
        ArtifactOutcome::new(Artifact::InterfaceStanza, &path, result)
    }

    pub fn sysctl_conf(&self, iface: &str, targets: &TargetSet) -> ArtifactOutcome {
        let path = &self.paths.sysctl_conf;
        let lines = sysctl_lines(iface, targets);
        let result = match read_optional(self.fs, path) {
            Ok(existing) => {
                match append_missing_lines(existing.as_deref().unwrap_or(""), &lines) {
                    Some(updated) => {
                        write_atomic(self.fs, path, &updated).map(|_| ArtifactStatus::Written)
                    }
                    None => Ok(ArtifactStatus::Unchanged),
                }
            }
            Err(e) => Err(e),
        };
        ArtifactOutcome::new(Artifact::SysctlConf, path, result)
    }

    /// Comment out rp_filter directives that would re-enable filtering at
    /// boot. Also used by the applier's rp_filter step.
    pub fn hardening_sysctl(&self, iface: &str) -> ArtifactOutcome {
        let path = &self.paths.hardening_sysctl;
        let result = match read_optional(self.fs, path) {
            Ok(None) => Ok(ArtifactStatus::Skipped("file not present".to_string())),
            Ok(Some(text)) => match comment_out_rp_filter(&text, iface) {
                Some(updated) => {
                    write_atomic(self.fs, path, &updated).map(|_| ArtifactStatus::Written)
                }
                None => Ok(ArtifactStatus::Unchanged),
            },
            Err(e) => Err(e),
        };
        ArtifactOutcome::new(Artifact::HardeningSysctl, path, result)
    }

    pub fn network_manager_conf(&self, iface: &str) -> ArtifactOutcome {
        let path = &self.paths.network_manager_conf;
        let result = match read_optional(self.fs, path) {
            Ok(None) => Ok(ArtifactStatus::Skipped("NetworkManager not configured".to_string())),
            Ok(Some(text)) => match ensure_unmanaged(&text, iface) {
                Some(updated) => {
                    write_atomic(self.fs, path, &updated).map(|_| ArtifactStatus::Written)
                }
                None => Ok(ArtifactStatus::Unchanged),
            },
            Err(e) => Err(e),
        };
        ArtifactOutcome::new(Artifact::NetworkManagerConf, path, result)
    }
}

fn read_optional(fs: &dyn FileSystem, path: &Path) -> io::Result<Option<String>> {
    match fs.read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist", path.display());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Static `ifupdown` stanza for the camera interface.
pub fn render_stanza(iface: &str, targets: &TargetSet, ring_max: Option<u32>) -> String {
    let mut out = format!(
        "auto {iface}\n\
         iface {iface} inet static\n    \
         address {}\n    \
         netmask {}\n    \
         mtu {}\n",
        targets.host.addr(),
        targets.host.netmask(),
        targets.mtu,
    );
    if let Some(max) = ring_max {
        out.push_str(&format!("    post-up /sbin/ethtool -G {} rx {}\n", iface, max));
    }
    out
}

/// `key=value` lines persisted to the system sysctl file.
pub fn sysctl_lines(iface: &str, targets: &TargetSet) -> Vec<String> {
    vec![
        format!("{}={}", RMEM_DEFAULT, targets.socket_buffer_bytes),
        format!("{}={}", RMEM_MAX, targets.socket_buffer_bytes),
        format!("{}=0", RP_FILTER_ALL),
        format!("{}=0", rp_filter_key(iface)),
    ]
}

/// Append each of `lines` not already present verbatim. `None` when
/// nothing is missing.
pub fn append_missing_lines(existing: &str, lines: &[String]) -> Option<String> {
    let missing: Vec<&String> = lines
        .iter()
        .filter(|wanted| !existing.lines().any(|l| l.trim() == wanted.as_str()))
        .collect();
    if missing.is_empty() {
        return None;
    }

    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in missing {
        out.push_str(line);
        out.push('\n');
    }
    Some(out)
}

/// Prefix `#` to uncommented, non-zero rp_filter directives for the `all`,
/// `default` and `iface` scopes. `None` when nothing needs commenting.
pub fn comment_out_rp_filter(text: &str, iface: &str) -> Option<String> {
    let keys = [
        RP_FILTER_ALL.to_string(),
        rp_filter_key("default"),
        rp_filter_key(iface),
    ];

    let mut changed = false;
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                return line.to_string();
            }
            let conflicting = trimmed
                .split_once('=')
                .map(|(k, v)| keys.iter().any(|key| key == k.trim()) && v.trim() != "0")
                .unwrap_or(false);
            if conflicting {
                changed = true;
                format!("#{}", line)
            } else {
                line.to_string()
            }
        })
        .collect();

    if !changed {
        return None;
    }
    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

/// Add `interface-name:<iface>` to `unmanaged-devices` under `[keyfile]`,
/// creating the key or the section as needed. `None` when already listed.
pub fn ensure_unmanaged(text: &str, iface: &str) -> Option<String> {
    if config_ignores(text, iface) {
        return None;
    }
    let device = format!("interface-name:{}", iface);
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(section) = lines.iter().position(|l| l.trim() == "[keyfile]") else {
        let mut out = text.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[keyfile]\nunmanaged-devices={}\n", device));
        return Some(out);
    };

    let section_end = lines[section + 1..]
        .iter()
        .position(|l| l.trim_start().starts_with('['))
        .map(|i| section + 1 + i)
        .unwrap_or(lines.len());

    let existing = (section + 1..section_end).find(|&i| {
        let l = lines[i].trim_start();
        !l.starts_with('#') && l.starts_with("unmanaged-devices=")
    });

    match existing {
        Some(i) => {
            let line = lines[i].trim_end().to_string();
            let separator = if line.ends_with('=') || line.ends_with(';') {
                ""
            } else {
                ";"
            };
            lines[i] = format!("{}{}{}", line, separator, device);
        }
        None => lines.insert(section + 1, format!("unmanaged-devices={}", device)),
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Some(out)
}
