//! Market data provider adapters

pub mod yahoo;

use crate::db::cache::models::DailyBar;
use crate::error::Result;
use async_trait::async_trait;

pub use yahoo::YahooChartProvider;

/// Live source of daily price history
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider ID, used in logs
    fn id(&self) -> &'static str;

    /// Daily bars for `period` (e.g. "2mo"), ascending by date.
    ///
    /// An unknown symbol or an empty series is `AppError::TickerNotFound`;
    /// rate limits, outages and timeouts are any other error.
    async fn daily_history(&self, ticker: &str, period: &str) -> Result<Vec<DailyBar>>;
}
