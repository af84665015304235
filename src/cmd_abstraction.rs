//! External command execution.
//!
//! Every external tool the orchestrator drives (`ip`, `ethtool`, `sysctl`,
//! `ufw`, `nmcli`, `arp-scan`, the vendor discovery binary) goes through
//! [`CommandExecutor`], so unit tests can script tool behaviour without
//! touching the host network stack.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Directories searched in addition to `$PATH`; `sudo` often strips the sbin
/// directories where `ip`, `ethtool` and `sysctl` live.
const EXTRA_TOOL_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status was zero
    pub success: bool,
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with exit code `code` carrying `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(code),
        }
    }
}

/// The real implementation spawns processes; tests use `MockCommandExecutor`
/// or the simulated host in `testing`.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args` and capture its output.
    ///
    /// A non-zero exit status is reported through `CommandOutput::success`;
    /// `Err` means the process could not be spawned at all.
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Whether `cmd` can be found on this host.
    fn is_available(&self, cmd: &str) -> bool;
}

/// Spawns the real tools on this host.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn resolve(cmd: &str) -> Option<PathBuf> {
        let candidate = Path::new(cmd);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&path_var)
            .chain(EXTRA_TOOL_DIRS.iter().map(PathBuf::from))
            .map(|dir| dir.join(cmd))
            .find(|p| p.is_file())
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let program = Self::resolve(cmd).unwrap_or_else(|| PathBuf::from(cmd));
        let output = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    fn is_available(&self, cmd: &str) -> bool {
        Self::resolve(cmd).is_some()
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes
/// `&[String]` instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
