//! Error types for gigelink.
//!
//! [`SetupError`] is the fatal class: it ends a run before anything else can
//! proceed. [`ToolError`] describes a single external tool invocation and is
//! folded into per-step outcomes rather than propagated.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("No wired Ethernet interface found (checked /sys/class/net)")]
    NoInterfaceFound,

    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Interface {0} looks wireless and was not confirmed")]
    WirelessDeclined(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Interrupted before any change was made")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0} is not installed")]
    Unavailable(String),

    #[error("{tool} failed: {detail}")]
    Failed { tool: String, detail: String },

    #[error("could not parse {tool} output: {detail}")]
    Parse { tool: String, detail: String },
}

impl ToolError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolError::Unavailable(_))
    }

    /// The tool ran but refused to answer without elevated privileges.
    pub fn needs_privilege(&self) -> bool {
        const MARKERS: [&str; 4] = [
            "need to be root",
            "must be root",
            "permission denied",
            "operation not permitted",
        ];
        match self {
            ToolError::Failed { detail, .. } => {
                let detail = detail.to_lowercase();
                MARKERS.iter().any(|m| detail.contains(m))
            }
            _ => false,
        }
    }
}
