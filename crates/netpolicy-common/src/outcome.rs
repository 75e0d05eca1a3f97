//! Best-effort result aggregation for multi-step command sequences.
//!
//! Install and uninstall sequences attempt every sub-step even after an
//! earlier sub-step failed, so that partial cleanup is never blocked by one
//! failing command. `CmdOutcome` is the explicit accumulator for that
//! policy: every failed command is recorded, and the sequence as a whole
//! fails if any command failed.

use crate::error::{NetPolicyError, NetPolicyResult};

/// Accumulates per-command results across a best-effort sequence.
#[derive(Debug, Default)]
pub struct CmdOutcome {
    failed: Vec<String>,
}

impl CmdOutcome {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of one command.
    pub fn record(&mut self, command: &str, success: bool) {
        if !success {
            self.failed.push(command.to_string());
        }
    }

    /// Returns true if every recorded command succeeded so far.
    pub fn ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of failed commands recorded so far.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Consumes the accumulator into an overall sequence result.
    pub fn into_result(self) -> NetPolicyResult<()> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(NetPolicyError::CommandSequence {
                failed: self.failed,
            })
        }
    }
}
