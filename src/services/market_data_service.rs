//! Market Data Service
//!
//! Cache-then-live resolution of daily price history. Live calls go through
//! the process-wide fetch permits; a per-ticker lock keeps concurrent jobs
//! from fetching the same missing ticker twice.

use crate::db::cache::models::{DailyBar, TickerCacheEntry};
use crate::error::{AppError, Result};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where a ticker's bars came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Cache,
    Live,
}

/// Outcome of a bulk cache refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub success: usize,
    pub failed: Vec<String>,
}

/// What the cache says about a ticker
enum CacheLookup {
    Hit(Vec<DailyBar>),
    /// Flagged unresolvable recently enough to skip the live call
    KnownInvalid,
    Miss,
}

/// Market data service for business logic
pub struct MarketDataService;

impl MarketDataService {
    /// Resolve one ticker's history, caching live results
    pub async fn fetch_one(state: &AppState, ticker: &str) -> Result<(Vec<DailyBar>, DataSource)> {
        let lock = state.ticker_lock(ticker);
        let _guard = lock.lock().await;

        match Self::lookup_cache(state, ticker) {
            CacheLookup::Hit(bars) => {
                debug!("[cache] Hit for {} ({} bars)", ticker, bars.len());
                return Ok((bars, DataSource::Cache));
            }
            CacheLookup::KnownInvalid => {
                info!("[cache] {} is marked invalid, skipping live fetch", ticker);
                return Err(AppError::ticker_not_found(ticker));
            }
            CacheLookup::Miss => debug!("[cache] Miss for {}", ticker),
        }

        match Self::fetch_live(state, ticker).await {
            Ok(bars) => {
                info!("[api] Fetched {} - {} bars", ticker, bars.len());
                if let Err(e) = state.cache.put(ticker, &state.config.history_period, &bars) {
                    warn!("[cache] Failed to store {}: {}", ticker, e);
                }
                Ok((bars, DataSource::Live))
            }
            Err(AppError::TickerNotFound { .. }) => {
                warn!("[api] {} is unknown to {}", ticker, state.provider.id());
                if let Err(e) = state.cache.mark_invalid(ticker) {
                    warn!("[cache] Failed to mark {} invalid: {}", ticker, e);
                }
                Err(AppError::ticker_not_found(ticker))
            }
            // Rate limits and outages say nothing about the symbol
            Err(e) => {
                warn!("[api] Failed to fetch {}: {}", ticker, e);
                Err(AppError::ticker_not_found(ticker))
            }
        }
    }

    /// Resolve every ticker concurrently.
    ///
    /// All fetches settle before returning; the first failure in ticker
    /// order is reported.
    pub async fn fetch_many(
        state: &AppState,
        tickers: &[String],
    ) -> Result<HashMap<String, Vec<DailyBar>>> {
        let results = join_all(tickers.iter().map(|t| Self::fetch_one(state, t))).await;

        let mut data = HashMap::with_capacity(tickers.len());
        for (ticker, result) in tickers.iter().zip(results) {
            let (bars, _) = result?;
            data.insert(ticker.clone(), bars);
        }
        Ok(data)
    }

    /// Re-fetch tickers live and overwrite their cache entries
    pub async fn refresh_all(state: &AppState, tickers: &[String]) -> RefreshSummary {
        let results = join_all(tickers.iter().map(|ticker| async move {
            let lock = state.ticker_lock(ticker);
            let _guard = lock.lock().await;

            let bars = Self::fetch_live(state, ticker).await?;
            state.cache.put(ticker, &state.config.history_period, &bars)
        }))
        .await;

        let mut summary = RefreshSummary::default();
        for (ticker, result) in tickers.iter().zip(results) {
            match result {
                Ok(count) => {
                    info!("[refresh] {} - {} records stored", ticker, count);
                    summary.success += 1;
                }
                Err(e) => {
                    warn!("[refresh] {} failed: {}", ticker, e);
                    summary.failed.push(ticker.clone());
                }
            }
        }

        info!(
            "[refresh] Done: {}/{} tickers stored, {} failed",
            summary.success,
            tickers.len(),
            summary.failed.len()
        );
        summary
    }

    fn lookup_cache(state: &AppState, ticker: &str) -> CacheLookup {
        let entry = match state.cache.get(ticker) {
            Ok(Some(entry)) => entry,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                warn!("[cache] Read failed for {}, treating as miss: {}", ticker, e);
                return CacheLookup::Miss;
            }
        };

        if let Some(bars) = entry.usable_bars() {
            return CacheLookup::Hit(bars.to_vec());
        }
        if !entry.is_valid && Self::invalid_flag_is_fresh(state, &entry) {
            return CacheLookup::KnownInvalid;
        }
        CacheLookup::Miss
    }

    /// An invalid flag holds for the configured TTL, then the ticker is retried
    fn invalid_flag_is_fresh(state: &AppState, entry: &TickerCacheEntry) -> bool {
        let Ok(flagged_at) = DateTime::parse_from_rfc3339(&entry.updated_at) else {
            return false;
        };
        let age = Utc::now().signed_duration_since(flagged_at.with_timezone(&Utc));
        age.to_std()
            .map(|age| age < state.config.invalid_ticker_ttl)
            .unwrap_or(true)
    }

    async fn fetch_live(state: &AppState, ticker: &str) -> Result<Vec<DailyBar>> {
        let _permit = state
            .fetch_permits
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("Fetch pool closed: {}", e)))?;

        let bars = state
            .provider
            .daily_history(ticker, &state.config.history_period)
            .await?;
        Ok(DailyBar::normalize(bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bars, test_state, FakeProvider};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let provider = FakeProvider::default();
        let (state, _dir) = test_state(provider.clone());
        state.cache.put("AAPL", "2mo", &bars(&[1.0, 2.0])).unwrap();

        let (fetched, source) = MarketDataService::fetch_one(&state, "AAPL").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(source, DataSource::Cache);
        assert_eq!(provider.calls("AAPL"), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_live_and_caches() {
        let provider = FakeProvider::default().with("MSFT", bars(&[3.0, 4.0, 5.0]));
        let (state, _dir) = test_state(provider.clone());

        let (fetched, source) = MarketDataService::fetch_one(&state, "MSFT").await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(source, DataSource::Live);

        let entry = state.cache.get("MSFT").unwrap().unwrap();
        assert!(entry.is_valid);
        assert_eq!(entry.record_count, 3);

        // Second call is served from the cache
        let (_, source) = MarketDataService::fetch_one(&state, "MSFT").await.unwrap();
        assert_eq!(source, DataSource::Cache);
        assert_eq!(provider.calls("MSFT"), 1);
    }

    #[tokio::test]
    async fn test_double_failure_marks_invalid() {
        let provider = FakeProvider::default();
        let (state, _dir) = test_state(provider.clone());

        let err = MarketDataService::fetch_one(&state, "NOPE").await.unwrap_err();
        assert!(matches!(err, AppError::TickerNotFound { ref ticker } if ticker == "NOPE"));
        assert!(!state.cache.get("NOPE").unwrap().unwrap().is_valid);

        // Fresh invalid flag short-circuits the live call
        let err = MarketDataService::fetch_one(&state, "NOPE").await.unwrap_err();
        assert!(err.is_business());
        assert_eq!(provider.calls("NOPE"), 1);
    }

    #[tokio::test]
    async fn test_provider_outage_does_not_mark_invalid() {
        let provider = FakeProvider::default().with("AAPL", bars(&[1.0, 2.0]));
        let (state, _dir) = test_state(provider.clone());

        provider.fail_transiently("AAPL", true);
        let err = MarketDataService::fetch_one(&state, "AAPL").await.unwrap_err();
        assert!(matches!(err, AppError::TickerNotFound { ref ticker } if ticker == "AAPL"));
        assert!(state.cache.get("AAPL").unwrap().is_none());

        // Next attempt goes live again and succeeds
        provider.fail_transiently("AAPL", false);
        let (fetched, source) = MarketDataService::fetch_one(&state, "AAPL").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(source, DataSource::Live);
        assert_eq!(provider.calls("AAPL"), 2);
    }

    #[tokio::test]
    async fn test_expired_invalid_flag_is_retried() {
        let provider = FakeProvider::default().with("LATE", bars(&[7.0, 8.0]));
        let (mut state, _dir) = test_state(provider.clone());
        let mut config = (*state.config).clone();
        config.invalid_ticker_ttl = Duration::ZERO;
        state.config = Arc::new(config);

        state.cache.mark_invalid("LATE").unwrap();
        let (fetched, source) = MarketDataService::fetch_one(&state, "LATE").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(source, DataSource::Live);
        assert!(state.cache.get("LATE").unwrap().unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_fetch_many_reports_first_failure_after_settling() {
        let provider = FakeProvider::default()
            .with("AAPL", bars(&[1.0, 2.0]))
            .with("ZZZ", bars(&[5.0, 6.0]));
        let (state, _dir) = test_state(provider);

        let tickers: Vec<String> = ["AAPL", "BAD1", "BAD2", "ZZZ"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let err = MarketDataService::fetch_many(&state, &tickers).await.unwrap_err();
        assert!(matches!(err, AppError::TickerNotFound { ref ticker } if ticker == "BAD1"));

        // Successful live results still reached the cache
        assert!(state.cache.get("AAPL").unwrap().is_some());
        assert!(state.cache.get("ZZZ").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let provider = FakeProvider::default().with("NVDA", bars(&[1.0, 2.0]));
        let (state, _dir) = test_state(provider.clone());

        let tickers = vec!["NVDA".to_string()];
        let (a, b) = tokio::join!(
            MarketDataService::fetch_many(&state, &tickers),
            MarketDataService::fetch_many(&state, &tickers)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.calls("NVDA"), 1);
    }

    #[tokio::test]
    async fn test_refresh_all_summary() {
        let provider = FakeProvider::default().with("AAPL", bars(&[1.0, 2.0]));
        let (state, _dir) = test_state(provider);
        state.cache.put("AAPL", "2mo", &bars(&[9.0])).unwrap();

        let summary =
            MarketDataService::refresh_all(&state, &["AAPL".to_string(), "NOPE".to_string()]).await;
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, vec!["NOPE".to_string()]);
        assert_eq!(state.cache.get("AAPL").unwrap().unwrap().bars.len(), 2);
    }
}
