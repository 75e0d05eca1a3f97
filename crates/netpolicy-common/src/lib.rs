//! Common infrastructure for network-policy daemons.
//!
//! This crate provides shared functionality for the policy-manager daemons
//! that drive Linux routing and firewall state from userspace:
//!
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`error`]: Error types for policy-manager operations
//! - [`outcome`]: Best-effort result aggregation for multi-step sequences
//!
//! # Architecture
//!
//! Policy managers follow this pattern:
//!
//! 1. A command dispatcher invokes one manager operation
//! 2. The manager issues an ordered sequence of `ip`/`iptables` commands
//! 3. Results are aggregated into a single success/failure outcome
//!
//! # Example
//!
//! ```ignore
//! use netpolicy_common::{
//!     shell::{self, IP_CMD, shellquote},
//!     NetPolicyResult,
//! };
//!
//! async fn flush_table(table: u32) -> NetPolicyResult<()> {
//!     let cmd = format!("{} route flush table {}", IP_CMD, table);
//!     let result = shell::exec(&cmd).await?;
//!     if !result.success() {
//!         tracing::warn!(table, "route flush failed");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod outcome;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{NetPolicyError, NetPolicyResult};
pub use outcome::CmdOutcome;
