//! Shell command execution for policy-manager daemons.
//!
//! Routing and firewall state is driven through the `ip` and `iptables`
//! binaries. This module provides safe command execution with proper
//! quoting so that interface names and addresses coming from the command
//! socket cannot inject shell syntax.
//!
//! # Example
//!
//! ```ignore
//! use netpolicy_common::shell::{self, IP_CMD, shellquote};
//!
//! let iface = "tun0";
//! let cmd = format!("{} route add default dev {} table 1005",
//!     IP_CMD, shellquote(iface));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{NetPolicyError, NetPolicyResult};

/// Path to the `ip` command for routes and policy rules.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `iptables` command for IPv4 mangle/NAT/filter rules.
pub const IPTABLES_CMD: &str = "/sbin/iptables";

/// Path to the `ip6tables` command for IPv6 mangle/NAT/filter rules.
pub const IP6TABLES_CMD: &str = "/sbin/ip6tables";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes any character that has
/// special meaning inside double quotes: `$`, `` ` ``, `"`, `\`, newline.
///
/// # Example
///
/// ```
/// use netpolicy_common::shell::shellquote;
///
/// assert_eq!(shellquote("tun0"), "\"tun0\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The combined stdout output.
    pub stdout: String,
    /// The combined stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously.
///
/// Runs the command through `/bin/sh -c`. A non-zero exit status is not an
/// `Err` here: callers inspect [`ExecResult::success`] so that best-effort
/// sequences can keep going after one failing command. Only a spawn
/// failure produces an error.
pub async fn exec(cmd: &str) -> NetPolicyResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| NetPolicyError::Spawn {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}
