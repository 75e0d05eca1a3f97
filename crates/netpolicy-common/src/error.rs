//! Error types for policy-manager operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Guard-stage
//! errors (`ResourceBusy`, `InvalidArgument`, `UnknownInterface`) are raised
//! before any kernel command runs; command errors are scoped to the single
//! requested operation and never fatal to the daemon.

use std::io;
use thiserror::Error;

/// Result type alias for policy-manager operations.
pub type NetPolicyResult<T> = Result<T, NetPolicyError>;

/// Errors that can occur during policy-manager operations.
#[derive(Debug, Error)]
pub enum NetPolicyError {
    /// Failed to spawn a shell command.
    #[error("Failed to execute shell command '{command}': {source}")]
    Spawn {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A routing/firewall command returned non-zero exit status.
    #[error("Routing command failed: '{command}'")]
    CommandFailed {
        /// The exact attempted command, for diagnosis.
        command: String,
    },

    /// One or more commands in a best-effort sequence failed.
    ///
    /// The whole sequence was attempted; the caller must assume some
    /// subset of steps succeeded and may need to retry the uninstall
    /// to reach a clean state.
    #[error("{} command(s) failed in sequence: {}", failed.len(), failed.join("; "))]
    CommandSequence {
        /// Every command in the sequence that returned non-zero.
        failed: Vec<String>,
    },

    /// The network already has manually-installed rule references, so a
    /// blanket fwmark setup would conflict with them.
    #[error("Network id {net_id} is busy: {count} rule reference(s) already installed")]
    ResourceBusy {
        /// The contested network id.
        net_id: u32,
        /// Number of existing rule references.
        count: u32,
    },

    /// A UID-range binding was rejected by the identity registry.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Rejection reason.
        message: String,
    },

    /// Network id resolution failed for an interface.
    #[error("Unknown interface '{iface}': no network id registered")]
    UnknownInterface {
        /// The interface name that failed to resolve.
        iface: String,
    },
}

impl NetPolicyError {
    /// Creates a command-failed error recording the attempted command.
    pub fn command_failed(command: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unknown-interface error.
    pub fn unknown_interface(iface: impl Into<String>) -> Self {
        Self::UnknownInterface {
            iface: iface.into(),
        }
    }

    /// Returns true if this error was raised before any kernel state changed.
    pub fn is_guard_error(&self) -> bool {
        matches!(
            self,
            NetPolicyError::ResourceBusy { .. }
                | NetPolicyError::InvalidArgument { .. }
                | NetPolicyError::UnknownInterface { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetPolicyError::unknown_interface("tun0");
        assert_eq!(
            err.to_string(),
            "Unknown interface 'tun0': no network id registered"
        );
    }

    #[test]
    fn test_command_failed() {
        let err = NetPolicyError::command_failed("/sbin/ip route add default dev tun0 table 1005");
        assert!(err.to_string().contains("ip route add default"));
    }

    #[test]
    fn test_resource_busy() {
        let err = NetPolicyError::ResourceBusy { net_id: 5, count: 2 };
        assert!(err.to_string().contains("Network id 5 is busy"));
        assert!(err.to_string().contains("2 rule reference(s)"));
    }

    #[test]
    fn test_command_sequence() {
        let err = NetPolicyError::CommandSequence {
            failed: vec!["cmd1".to_string(), "cmd2".to_string()],
        };
        assert!(err.to_string().contains("2 command(s) failed"));
        assert!(err.to_string().contains("cmd1; cmd2"));
    }

    #[test]
    fn test_is_guard_error() {
        assert!(NetPolicyError::ResourceBusy { net_id: 1, count: 1 }.is_guard_error());
        assert!(NetPolicyError::unknown_interface("tun0").is_guard_error());
        assert!(NetPolicyError::invalid_argument("overlap").is_guard_error());
        assert!(!NetPolicyError::command_failed("ip rule add").is_guard_error());
    }
}
