//! Worker command: consume the job queue

use super::idle;
use crate::error::Result;
use crate::services::ReportService;
use crate::state::AppState;
use tracing::{error, info, warn};

/// Poll the job queue until ctrl-c, or for a single receive with `once`
pub async fn run(state: &AppState, once: bool) -> Result<()> {
    info!(
        "[worker] Polling {} (batch size {}, poll interval {:?})",
        state.jobs.name(),
        state.config.receive_batch_size,
        state.config.poll_interval
    );

    loop {
        let received = match poll_once(state).await {
            Ok(received) => received,
            Err(e) => {
                error!("[worker] Receive failed: {}", e);
                0
            }
        };

        if once {
            return Ok(());
        }
        if received == 0 && !idle(state.config.poll_interval).await {
            return Ok(());
        }
    }
}

/// Receive one batch and process it.
///
/// The batch is acknowledged only when every message was handled; a
/// transient failure leaves all of it for redelivery. Returns how many
/// messages were received.
pub async fn poll_once(state: &AppState) -> Result<usize> {
    let messages = state.jobs.receive(state.config.receive_batch_size).await?;
    if messages.is_empty() {
        return Ok(0);
    }

    match ReportService::process_batch(state, &messages).await {
        Ok(outcome) => {
            for message in &messages {
                if let Err(e) = state.jobs.delete(&message.receipt_handle).await {
                    warn!("[worker] Failed to delete message {}: {}", message.message_id, e);
                }
            }
            info!(
                "[worker] Batch done: {} finished, {} handled",
                outcome.processed_messages,
                outcome.reports.len()
            );
        }
        Err(e) => {
            error!(
                "[worker] Batch of {} left for redelivery: {}",
                messages.len(),
                e
            );
        }
    }

    Ok(messages.len())
}
