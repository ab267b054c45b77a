//! Process entry points
//!
//! Each subcommand of the binary maps to one function here. Commands own the
//! poll loops and shutdown handling; business logic stays in `services`.

pub mod produce;
pub mod reconcile;
pub mod refresh;
pub mod serve;
pub mod stale;
pub mod work;

use std::time::Duration;

/// Sleep for `interval`, returning `false` when ctrl-c arrived first
pub(crate) async fn idle(interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            false
        }
    }
}
