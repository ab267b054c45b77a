//! Shared fakes for unit tests

use crate::config::Config;
use crate::db::cache::models::DailyBar;
use crate::db::cache::MarketCacheDb;
use crate::db::sqlite::LedgerDb;
use crate::error::{AppError, Result};
use crate::providers::MarketDataProvider;
use crate::queue::{JobQueue, SqliteQueue};
use crate::render::PdfDashboardRenderer;
use crate::state::AppState;
use crate::storage::LocalObjectStore;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Consecutive daily bars with the given closes
pub fn bars(closes: &[f64]) -> Vec<DailyBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| DailyBar {
            date: format!("2024-01-{:02}", i + 1),
            open: *close,
            high: *close,
            low: *close,
            close: *close,
            volume: 1_000,
        })
        .collect()
}

/// Provider serving canned series; unknown tickers are not found
#[derive(Clone, Default)]
pub struct FakeProvider {
    series: Arc<DashMap<String, Vec<DailyBar>>>,
    calls: Arc<DashMap<String, usize>>,
    unavailable: Arc<DashSet<String>>,
}

impl FakeProvider {
    pub fn with(self, ticker: &str, bars: Vec<DailyBar>) -> Self {
        self.series.insert(ticker.to_string(), bars);
        self
    }

    /// Answer `ticker` with an outage-style error while `on` is set
    pub fn fail_transiently(&self, ticker: &str, on: bool) {
        if on {
            self.unavailable.insert(ticker.to_string());
        } else {
            self.unavailable.remove(ticker);
        }
    }

    pub fn calls(&self, ticker: &str) -> usize {
        self.calls.get(ticker).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn daily_history(&self, ticker: &str, _period: &str) -> Result<Vec<DailyBar>> {
        *self.calls.entry(ticker.to_string()).or_insert(0) += 1;
        if self.unavailable.contains(ticker) {
            return Err(AppError::Provider(format!("429 Too Many Requests for {}", ticker)));
        }
        self.series
            .get(ticker)
            .map(|bars| bars.clone())
            .ok_or_else(|| AppError::ticker_not_found(ticker))
    }
}

/// State over a temporary directory, local storage and SQLite queues
pub fn test_state(provider: FakeProvider) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    let config = Config::from_lookup(|key| match key {
        "DATA_DIR" => Some(data_dir.clone()),
        "VISIBILITY_TIMEOUT_SECS" => Some("0".to_string()),
        _ => None,
    })
    .unwrap();

    let ledger = Arc::new(LedgerDb::new(&config.ledger_db_path).unwrap());
    let cache = Arc::new(MarketCacheDb::new(&config.market_db_path).unwrap());
    let jobs: Arc<dyn JobQueue> = Arc::new(
        SqliteQueue::new(ledger.clone(), &config.job_queue, Duration::ZERO)
            .with_dead_letter(&config.dead_letter_queue, config.max_receive_count),
    );
    let dead_letters: Arc<dyn JobQueue> = Arc::new(SqliteQueue::new(
        ledger.clone(),
        &config.dead_letter_queue,
        Duration::ZERO,
    ));
    let storage = Arc::new(LocalObjectStore::new(dir.path().join("objects")));

    let state = AppState::from_parts(
        config,
        ledger,
        cache,
        jobs,
        dead_letters,
        Arc::new(provider),
        storage,
        Arc::new(PdfDashboardRenderer::new()),
    );
    (state, dir)
}
