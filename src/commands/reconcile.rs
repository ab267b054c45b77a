//! Reconciler command: drain the dead-letter queue

use super::idle;
use crate::error::Result;
use crate::services::ReconcilerService;
use crate::state::AppState;
use tracing::{error, info, warn};

/// Poll the dead-letter queue until ctrl-c, or for a single receive with `once`
pub async fn run(state: &AppState, once: bool) -> Result<()> {
    info!("[dlq] Polling {}", state.dead_letters.name());

    loop {
        let received = match poll_once(state).await {
            Ok(received) => received,
            Err(e) => {
                error!("[dlq] Receive failed: {}", e);
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

/// Receive one batch, reconcile it and delete every message.
///
/// Messages that could not be reconciled are deleted too; they were already
/// logged and a retry would fail the same way.
pub async fn poll_once(state: &AppState) -> Result<usize> {
    let messages = state
        .dead_letters
        .receive(state.config.receive_batch_size)
        .await?;
    if messages.is_empty() {
        return Ok(0);
    }

    let processed = ReconcilerService::reconcile(state, &messages).await;
    for message in &messages {
        if let Err(e) = state.dead_letters.delete(&message.receipt_handle).await {
            warn!("[dlq] Failed to delete message {}: {}", message.message_id, e);
        }
    }
    info!("[dlq] Batch done: {}/{} reconciled", processed, messages.len());

    Ok(messages.len())
}
