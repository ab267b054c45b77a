//! Producer command: submit one batch of random portfolios

use crate::db::sqlite::models::Portfolio;
use crate::error::Result;
use crate::services::{BatchSubmission, ProducerService};
use crate::state::AppState;
use tracing::info;

/// Build `count` random portfolios of `tickers` holdings each and queue them
/// under a fresh batch number
pub async fn run(state: &AppState, count: usize, tickers: usize) -> Result<BatchSubmission> {
    let batch_no = ProducerService::new_batch_no()?;
    info!(
        "[producer] Batch {}: {} portfolios of {} tickers each",
        batch_no, count, tickers
    );

    let portfolios = {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                ProducerService::random_portfolio(
                    &mut rng,
                    tickers,
                    &state.config.benchmark_ticker,
                )
            })
            .collect::<Result<Vec<Portfolio>>>()?
    };

    ProducerService::submit_batch(state, batch_no, &portfolios).await
}
