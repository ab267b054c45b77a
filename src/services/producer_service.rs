//! Producer Service
//!
//! Creates ledger rows for a batch of portfolios and enqueues one job each.

use crate::db::sqlite::models::{Portfolio, ReportStatus};
use crate::error::{AppError, Result};
use crate::queue::JobMessage;
use crate::state::AppState;
use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};

pub const SEND_FAILED_MESSAGE: &str = "Failed to Send Message to Queue";

/// Default ticker universe with share counts
pub const UNIVERSE: &[(&str, u32)] = &[
    ("AAPL", 9),
    ("MSFT", 13),
    ("GOOGL", 4),
    ("TSLA", 7),
    ("NVDA", 10),
    ("SPY", 20),
    ("AMZN", 2),
    ("META", 2),
    ("BRK.B", 2),
    ("AVGO", 2),
    ("GOOG", 2),
    ("JPM", 2),
    ("LLY", 2),
    ("V", 2),
    ("UNH", 2),
    ("XOM", 2),
    ("MA", 2),
    ("PG", 2),
    ("JNJ", 2),
    ("HD", 2),
    ("COST", 2),
    ("ORCL", 2),
    ("AMD", 2),
    ("BAC", 2),
    ("NFLX", 2),
    ("CRM", 2),
    ("ABT", 2),
    ("WMT", 2),
    ("TMO", 2),
    ("CVX", 2),
    ("ACN", 2),
    ("KO", 2),
    ("AVY", 2),
    ("PM", 2),
    ("DIS", 2),
    ("PFE", 2),
    ("INTU", 2),
    ("ADBE", 2),
    ("TXN", 2),
    ("CSCO", 2),
    ("NEE", 2),
    ("WFC", 2),
    ("ABBV", 2),
    ("DHR", 2),
    ("COP", 2),
    ("IBM", 2),
    ("QCOM", 2),
    ("CAT", 2),
    ("RTX", 2),
    ("AXP", 2),
    ("GS", 2),
    ("BLK", 2),
    ("AMGN", 2),
    ("BX", 2),
    ("PLD", 2),
    ("LIN", 2),
];

/// Tickers of the default universe
pub fn universe_tickers() -> Vec<String> {
    UNIVERSE.iter().map(|(t, _)| t.to_string()).collect()
}

/// Summary of a submitted batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub batch_no: i64,
    pub queued: usize,
    /// Rows that already existed
    pub skipped: usize,
    /// Rows whose message could not be sent
    pub failed: usize,
}

/// Producer service for business logic
pub struct ProducerService;

impl ProducerService {
    /// Batch number from the local wall clock, `YYYYmmddHHMMSS`
    pub fn new_batch_no() -> Result<i64> {
        Local::now()
            .format("%Y%m%d%H%M%S")
            .to_string()
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid batch number: {}", e)))
    }

    /// `n` random holdings from the universe, plus the benchmark when it is
    /// part of the universe
    pub fn random_portfolio<R: Rng + ?Sized>(
        rng: &mut R,
        n: usize,
        benchmark: &str,
    ) -> Result<Portfolio> {
        let stocks: Vec<&(&str, u32)> =
            UNIVERSE.iter().filter(|(t, _)| *t != benchmark).collect();

        let mut holdings: BTreeMap<String, i64> = stocks
            .choose_multiple(rng, n.min(stocks.len()))
            .map(|(t, s)| (t.to_string(), *s as i64))
            .collect();

        if let Some((t, s)) = UNIVERSE.iter().find(|(t, _)| *t == benchmark) {
            holdings.insert(t.to_string(), *s as i64);
        }

        Portfolio::try_from(holdings)
    }

    /// Create, mark QUEUED and send one job per portfolio.
    ///
    /// Report ids are the portfolios' positions in the batch. A row is
    /// QUEUED before its message is sent so a fast worker can always claim
    /// it; a failed send marks the row FAILED.
    pub async fn submit_batch(
        state: &AppState,
        batch_no: i64,
        portfolios: &[Portfolio],
    ) -> Result<BatchSubmission> {
        let mut submission = BatchSubmission {
            batch_no,
            queued: 0,
            skipped: 0,
            failed: 0,
        };

        for (report_id, portfolio) in portfolios.iter().enumerate() {
            let report_id = report_id as i64;
            let prefix = format!("[batch={} report={}]", batch_no, report_id);

            let (_, created) = state.ledger.create(report_id, batch_no, portfolio)?;
            if !created {
                info!("{} Already exists, skipping", prefix);
                submission.skipped += 1;
                continue;
            }
            info!("{} Status: CREATED", prefix);

            state
                .ledger
                .update_status(report_id, batch_no, ReportStatus::Queued, None, None)?;

            let body = serde_json::to_string(&JobMessage {
                report_id,
                batch_no,
                payload: portfolio.clone().into(),
            })?;

            match state.jobs.send(&body).await {
                Ok(message_id) => {
                    info!(
                        "{} Status: QUEUED, sent to {} as {}",
                        prefix,
                        state.jobs.name(),
                        message_id
                    );
                    submission.queued += 1;
                }
                Err(e) => {
                    error!("{} Failed to send to {}: {}", prefix, state.jobs.name(), e);
                    state.ledger.update_status(
                        report_id,
                        batch_no,
                        ReportStatus::Failed,
                        None,
                        Some(SEND_FAILED_MESSAGE),
                    )?;
                    submission.failed += 1;
                }
            }
        }

        info!(
            "[producer] Batch {}: {} queued, {} skipped, {} failed",
            batch_no, submission.queued, submission.skipped, submission.failed
        );
        Ok(submission)
    }
}
