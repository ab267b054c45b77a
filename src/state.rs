//! Application state: the clients every component works through
//!
//! Built once by the process entry point and passed by reference into
//! services, the API and the scheduler.

use crate::config::Config;
use crate::db::cache::MarketCacheDb;
use crate::db::sqlite::LedgerDb;
use crate::error::Result;
use crate::providers::{MarketDataProvider, YahooChartProvider};
use crate::queue::{JobQueue, SqliteQueue};
use crate::render::{PdfDashboardRenderer, ReportRenderer};
use crate::storage::{self, ObjectStore};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Application state shared across all processes
pub struct AppState {
    pub config: Arc<Config>,

    /// SQLite ledger (also backs the queues)
    pub ledger: Arc<LedgerDb>,

    /// SQLite market data cache
    pub cache: Arc<MarketCacheDb>,

    /// Job queue consumed by workers
    pub jobs: Arc<dyn JobQueue>,

    /// Dead-letter queue consumed by the reconciler
    pub dead_letters: Arc<dyn JobQueue>,

    /// Live market data source
    pub provider: Arc<dyn MarketDataProvider>,

    /// Upload target for rendered reports
    pub storage: Arc<dyn ObjectStore>,

    pub renderer: Arc<dyn ReportRenderer>,

    /// Live fetch permits shared by all jobs in the process
    pub fetch_permits: Arc<Semaphore>,

    /// Per-ticker fetch locks (ticker -> lock)
    ticker_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        tracing::info!("Data directory: {:?}", config.data_dir);

        // Initialize SQLite ledger
        let ledger = Arc::new(LedgerDb::new(&config.ledger_db_path)?);

        // Initialize market data cache
        let cache = Arc::new(MarketCacheDb::new(&config.market_db_path)?);

        let jobs: Arc<dyn JobQueue> = Arc::new(
            SqliteQueue::new(ledger.clone(), &config.job_queue, config.visibility_timeout)
                .with_dead_letter(&config.dead_letter_queue, config.max_receive_count),
        );
        let dead_letters: Arc<dyn JobQueue> = Arc::new(SqliteQueue::new(
            ledger.clone(),
            &config.dead_letter_queue,
            config.visibility_timeout,
        ));

        let provider: Arc<dyn MarketDataProvider> =
            Arc::new(YahooChartProvider::new(&config.market_data_base_url)?);
        let storage = storage::from_backend(&config.storage)?;
        let renderer: Arc<dyn ReportRenderer> = Arc::new(PdfDashboardRenderer::new());

        Ok(Self::from_parts(
            config,
            ledger,
            cache,
            jobs,
            dead_letters,
            provider,
            storage,
            renderer,
        ))
    }

    /// Assemble state from already constructed clients
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        config: Config,
        ledger: Arc<LedgerDb>,
        cache: Arc<MarketCacheDb>,
        jobs: Arc<dyn JobQueue>,
        dead_letters: Arc<dyn JobQueue>,
        provider: Arc<dyn MarketDataProvider>,
        storage: Arc<dyn ObjectStore>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(config.fetch_concurrency));

        Self {
            config: Arc::new(config),
            ledger,
            cache,
            jobs,
            dead_letters,
            provider,
            storage,
            renderer,
            fetch_permits,
            ticker_locks: DashMap::new(),
        }
    }

    /// Lock serialising cache-or-fetch for one ticker
    pub fn ticker_lock(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.ticker_locks
            .entry(ticker.to_string())
            .or_default()
            .clone()
    }
}
