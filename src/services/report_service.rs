//! Report Service
//!
//! Drives one job through the report state machine:
//!
//! ```text
//! QUEUED -claim-> IN_PROGRESS -render-> UPLOAD_STARTED -upload-> FINISHED
//!                      \________________________/
//!                        ticker not resolvable -> REJECTED (+ dead letter)
//! ```
//!
//! Transient errors leave the ledger as is and propagate so the queue
//! redelivers the message. A failed claim means another delivery owns the
//! job and the message is dropped without side effects.

use crate::db::sqlite::models::{JobRecord, Portfolio, ReportStatus};
use crate::error::Result;
use crate::queue::{JobMessage, QueueMessage};
use crate::services::analytics_service::AnalyticsService;
use crate::services::market_data_service::MarketDataService;
use crate::state::AppState;
use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

/// Result of processing a batch of deliveries
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Jobs that reached FINISHED
    pub processed_messages: usize,
    /// Final records of every job handled in this batch (finished or rejected)
    pub reports: Vec<JobRecord>,
}

/// Report service for business logic
pub struct ReportService;

impl ReportService {
    /// Process received job messages in order.
    ///
    /// Stops at the first transient error and returns it; the caller must
    /// then leave the whole batch for redelivery.
    pub async fn process_batch(state: &AppState, messages: &[QueueMessage]) -> Result<BatchOutcome> {
        info!("[worker] Received {} message(s)", messages.len());

        let mut outcome = BatchOutcome::default();
        for (idx, message) in messages.iter().enumerate() {
            let position = format!("{}/{}", idx + 1, messages.len());
            if let Some(record) = Self::process_message(state, message, &position).await? {
                if record.status == ReportStatus::Finished {
                    outcome.processed_messages += 1;
                }
                outcome.reports.push(record);
            }
        }

        info!(
            "[worker] Finished {}/{} message(s)",
            outcome.processed_messages,
            messages.len()
        );
        Ok(outcome)
    }

    /// Process one delivery.
    ///
    /// Returns the final record, or `None` when the message was skipped
    /// (unparseable, or a duplicate delivery).
    pub async fn process_message(
        state: &AppState,
        message: &QueueMessage,
        position: &str,
    ) -> Result<Option<JobRecord>> {
        let job: JobMessage = match serde_json::from_str(&message.body) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    "[worker {}] Unparseable message {}: {}",
                    position, message.message_id, e
                );
                Self::forward_to_dead_letter(state, message, "unparseable message").await;
                return Ok(None);
            }
        };

        let prefix = format!(
            "[batch={} report={} ({})]",
            job.batch_no, job.report_id, position
        );

        if !state.ledger.claim(job.report_id, job.batch_no)? {
            Self::log_claim_conflict(state, &job, &prefix)?;
            return Ok(None);
        }
        info!("{} Status: IN_PROGRESS", prefix);

        match Self::run_job(state, &job, &prefix).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_business() => {
                let reason = e.to_string();
                let record = state.ledger.update_status(
                    job.report_id,
                    job.batch_no,
                    ReportStatus::Rejected,
                    None,
                    Some(&reason),
                )?;
                warn!("{} Status: REJECTED - {}", prefix, reason);
                Self::forward_to_dead_letter(state, message, &prefix).await;
                Ok(Some(record))
            }
            Err(e) => {
                error!("{} Retrying message: {}", prefix, e);
                Err(e)
            }
        }
    }

    /// Fetch, compute, render, upload and finish a claimed job
    async fn run_job(state: &AppState, job: &JobMessage, prefix: &str) -> Result<JobRecord> {
        let portfolio = Portfolio::try_from(job.payload.clone())?;
        let tickers: Vec<String> = portfolio.tickers().map(str::to_string).collect();

        info!("{} Fetching market data for tickers: {:?}", prefix, tickers);
        let data = MarketDataService::fetch_many(state, &tickers).await?;

        info!("{} Calculating portfolio metrics...", prefix);
        let report = AnalyticsService::build_report(
            job.report_id,
            job.batch_no,
            &portfolio,
            &data,
            &state.config.benchmark_ticker,
        );

        info!(
            "{} Generating document... total_value=${:.2}",
            prefix, report.total_value
        );
        let document = state.renderer.render(&report)?;

        let key = Self::object_key(job.batch_no, job.report_id);
        state.ledger.update_status(
            job.report_id,
            job.batch_no,
            ReportStatus::UploadStarted,
            Some(&key),
            None,
        )?;
        info!(
            "{} Status: UPLOAD_STARTED -> {}:{}",
            prefix,
            state.storage.backend(),
            key
        );

        state
            .storage
            .put(&key, document, state.renderer.content_type())
            .await?;

        let record = state.ledger.update_status(
            job.report_id,
            job.batch_no,
            ReportStatus::Finished,
            Some(&key),
            None,
        )?;
        info!("{} Status: FINISHED", prefix);
        Ok(record)
    }

    /// `reports/batch-{batch_no}/{report_id}/portfolio_dashboard_{timestamp}.pdf`
    pub fn object_key(batch_no: i64, report_id: i64) -> String {
        format!(
            "reports/batch-{}/{}/portfolio_dashboard_{}.pdf",
            batch_no,
            report_id,
            Local::now().format("%Y%m%d%H%M%S")
        )
    }

    fn log_claim_conflict(state: &AppState, job: &JobMessage, prefix: &str) -> Result<()> {
        match state.ledger.get(job.report_id, job.batch_no)? {
            Some(current) if current.status == ReportStatus::InProgress => warn!(
                "{} Claim failed: already IN_PROGRESS since {}; a crashed worker leaves it stuck",
                prefix, current.updated_at
            ),
            Some(current) => info!(
                "{} Duplicate delivery, status is {}, skipping",
                prefix, current.status
            ),
            None => warn!("{} No ledger row for job, skipping", prefix),
        }
        Ok(())
    }

    /// Send the delivery envelope to the dead-letter queue.
    ///
    /// Failures are logged only; the ledger already records the outcome.
    async fn forward_to_dead_letter(state: &AppState, message: &QueueMessage, prefix: &str) {
        let envelope = match serde_json::to_string(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("{} Failed to encode dead-letter envelope: {}", prefix, e);
                return;
            }
        };

        match state.dead_letters.send(&envelope).await {
            Ok(id) => info!(
                "{} Sent message to {} as {}",
                prefix,
                state.dead_letters.name(),
                id
            ),
            Err(e) => error!(
                "{} Failed to send message to {}: {}",
                prefix,
                state.dead_letters.name(),
                e
            ),
        }
    }
}
