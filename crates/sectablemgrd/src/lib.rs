//! Secondary routing-table policy manager
//!
//! Routes traffic for specific networks (VPN-like tunnels) through
//! dedicated kernel routing tables selected by packet mark or by
//! originating UID, while default traffic stays on the main table.

mod commands;
mod registry;
mod rule_count;
mod sec_table_mgr;
mod types;

pub use commands::*;
pub use registry::{NetworkRegistry, StaticRegistry};
pub use rule_count::RuleRefCounter;
pub use sec_table_mgr::SecTableMgr;
pub use types::*;
