//! Adapters for the external tools the orchestrator drives.
//!
//! Each adapter owns the exact invocation arguments for one tool and a pure
//! `parse_*` function for its output, so parsing can be tested against
//! captured samples without running anything.

pub mod ethtool;
pub mod firewall;
pub mod ip;
pub mod network_manager;
pub mod scan;
pub mod sysctl;

use tracing::debug;

use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput};
use crate::error::ToolError;

/// Run `program` and return its stdout, mapping a missing binary to
/// [`ToolError::Unavailable`] and a non-zero exit to [`ToolError::Failed`].
pub(crate) fn exec(
    cmd: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
) -> Result<String, ToolError> {
    let output = exec_raw(cmd, program, args)?;
    if output.success {
        Ok(output.stdout)
    } else {
        let detail = if output.stderr.trim().is_empty() {
            format!("exit code {:?}", output.code)
        } else {
            output.stderr.trim().to_string()
        };
        Err(ToolError::Failed {
            tool: program.to_string(),
            detail,
        })
    }
}

/// Like [`exec`] but hands back the output regardless of exit status, for
/// tools that encode answers in their exit code (`systemctl is-active`).
pub(crate) fn exec_raw(
    cmd: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ToolError> {
    if !cmd.is_available(program) {
        return Err(ToolError::Unavailable(program.to_string()));
    }
    debug!("exec: {} {}", program, args.join(" "));
    cmd.execute(program, &args_to_strings(args))
        .map_err(|e| ToolError::Failed {
            tool: program.to_string(),
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::MockCommandExecutor;

    #[test]
    fn test_exec_unavailable() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_is_available().returning(|_| false);
        mock.expect_execute().never();

        let err = exec(&mock, "ethtool", &["-g", "eth0"]).unwrap_err();
        assert_eq!(err, ToolError::Unavailable("ethtool".to_string()));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_exec_failure_uses_stderr() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_is_available().returning(|_| true);
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::failed(2, "Operation not permitted\n")));

        let err = exec(&mock, "ip", &["link", "set", "dev", "eth0", "up"]).unwrap_err();
        assert_eq!(
            err,
            ToolError::Failed {
                tool: "ip".to_string(),
                detail: "Operation not permitted".to_string()
            }
        );
    }

    #[test]
    fn test_exec_failure_without_stderr() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_is_available().returning(|_| true);
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::failed(3, "")));

        let err = exec(&mock, "ufw", &["reload"]).unwrap_err();
        assert!(err.to_string().contains("exit code Some(3)"));
    }

    #[test]
    fn test_exec_raw_keeps_nonzero_output() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_is_available().returning(|_| true);
        mock.expect_execute().returning(|_, _| {
            Ok(CommandOutput {
                stdout: "inactive\n".to_string(),
                stderr: String::new(),
                success: false,
                code: Some(3),
            })
        });

        let output = exec_raw(&mock, "systemctl", &["is-active", "NetworkManager"]).unwrap();
        assert_eq!(output.stdout.trim(), "inactive");
    }
}
