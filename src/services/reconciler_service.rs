//! Reconciler Service
//!
//! Drains dead-letter messages and finalises their ledger rows as FAILED.

use crate::db::sqlite::models::ReportStatus;
use crate::error::{AppError, Result};
use crate::queue::QueueMessage;
use crate::state::AppState;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

pub const FAILED_MESSAGE: &str =
    "Marked Report as Failed to process and informed concerned stakeholders";

/// Job key carried by a dead-letter message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JobKey {
    pub report_id: i64,
    pub batch_no: i64,
}

/// Reconciler service for business logic
pub struct ReconcilerService;

impl ReconcilerService {
    /// Force every message's job to FAILED.
    ///
    /// A bad message is logged and skipped. Returns how many were handled.
    pub async fn reconcile(state: &AppState, messages: &[QueueMessage]) -> usize {
        let total = messages.len();
        info!("[dlq] Received {} record(s)", total);

        let mut processed = 0;
        for (idx, message) in messages.iter().enumerate() {
            match Self::reconcile_one(state, message) {
                Ok(key) => {
                    info!(
                        "[dlq {}/{} report={} batch={}] Done",
                        idx + 1,
                        total,
                        key.report_id,
                        key.batch_no
                    );
                    processed += 1;
                }
                Err(e) => error!(
                    "[dlq {}/{}] Error processing message {}: {}",
                    idx + 1,
                    total,
                    message.message_id,
                    e
                ),
            }
        }

        info!("[dlq] Processed {}/{} messages", processed, total);
        processed
    }

    fn reconcile_one(state: &AppState, message: &QueueMessage) -> Result<JobKey> {
        let key = Self::extract_key(&message.body)?;

        match state
            .ledger
            .force_fail(key.report_id, key.batch_no, FAILED_MESSAGE)?
        {
            Some(record) => info!(
                "[dlq report={} batch={}] Status: {}",
                key.report_id, key.batch_no, record.status
            ),
            None => info!(
                "[dlq report={} batch={}] Already {}, left untouched",
                key.report_id,
                key.batch_no,
                ReportStatus::Finished
            ),
        }
        Ok(key)
    }

    /// Read the job key from a raw job body or a wrapped delivery envelope.
    ///
    /// An object with a string `body` field is unwrapped one level.
    pub fn extract_key(body: &str) -> Result<JobKey> {
        let outer: Value = serde_json::from_str(body)?;

        let inner = match outer.get("body") {
            Some(Value::String(inner)) => serde_json::from_str(inner)?,
            Some(_) => {
                return Err(AppError::Validation(
                    "Dead-letter envelope body is not a string".to_string(),
                ))
            }
            None => outer,
        };

        Ok(serde_json::from_value(inner)?)
    }
}
