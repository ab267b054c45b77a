//! Serve command: status API plus the daily refresh scheduler

use crate::api::ApiServer;
use crate::error::Result;
use crate::scheduler::RefreshScheduler;
use crate::state::AppState;
use std::sync::Arc;
use tracing::info;

/// Run until ctrl-c
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let scheduler = if state.config.refresh.enabled {
        Some(RefreshScheduler::new(state.clone()).start())
    } else {
        info!("Refresh scheduler disabled");
        None
    };

    let mut server = ApiServer::new(state);
    let handle = server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.stop();
    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    if let Err(e) = handle.await {
        tracing::warn!("API server task ended abnormally: {}", e);
    }

    Ok(())
}
