//! sectablemgrd - secondary routing-table policy manager daemon
//!
//! Installs the base mangle/NAT/filter hooks and serves per-network
//! routing operations dispatched from the command socket.

use std::process::ExitCode;

use sectablemgrd::{SecTableMgr, StaticRegistry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    info!("--- Starting sectablemgrd ---");

    let registry = StaticRegistry::new();
    let mut mgr = SecTableMgr::new(registry);

    if let Err(e) = mgr.setup_iptables_hooks().await {
        error!(error = %e, "base hook setup completed with failures");
        return ExitCode::FAILURE;
    }

    info!("sectablemgrd initialization complete");

    // TODO: Wire up the command-socket dispatcher once the front end
    // lands; operations are then served from a Mutex-held manager.

    ExitCode::SUCCESS
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}
