//! Common utility functions used across modules.
//!
//! - [`check_root`] - Verify effective UID 0
//! - [`exit_code`] - Map an error count to a process exit code
//! - [`format_bytes`] - Format byte sizes (KB, MB, GB)

use crate::error::SetupError;

/// Check if running as root (effective UID == 0).
///
/// Setup changes links, sysctls, firewall rules and files under `/etc`;
/// all of these need root or the equivalent capabilities.
pub fn check_root() -> Result<(), SetupError> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions, never fails, and doesn't modify any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(SetupError::Permission(format!(
            "setup requires root privileges (running as UID {}). Please run with sudo.",
            euid
        )));
    }
    Ok(())
}

/// Exit code for a run with `errors` non-fatal errors, capped at 255.
///
/// # Examples
/// ```
/// use gigelink::utils::exit_code;
/// assert_eq!(exit_code(0), 0);
/// assert_eq!(exit_code(3), 3);
/// assert_eq!(exit_code(1000), 255);
/// ```
pub fn exit_code(errors: usize) -> u8 {
    u8::try_from(errors).unwrap_or(u8::MAX)
}

/// Format bytes in human-readable form (KB, MB, GB).
///
/// # Examples
/// ```
/// use gigelink::utils::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(26_214_400), "25.0 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
