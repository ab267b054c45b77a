//! Refresh command: warm the market data cache

use crate::services::producer_service::universe_tickers;
use crate::services::{MarketDataService, RefreshSummary};
use crate::state::AppState;

/// Re-fetch the given tickers live, or the default universe when none are given
pub async fn run(state: &AppState, tickers: &[String]) -> RefreshSummary {
    let tickers: Vec<String> = if tickers.is_empty() {
        universe_tickers()
    } else {
        tickers.iter().map(|t| t.trim().to_uppercase()).collect()
    };

    MarketDataService::refresh_all(state, &tickers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bars, test_state, FakeProvider};

    #[tokio::test]
    async fn test_refresh_normalises_tickers() {
        let provider = FakeProvider::default().with("MSFT", bars(&[1.0, 2.0, 3.0]));
        let (state, _dir) = test_state(provider.clone());

        let summary = run(&state, &[" msft ".to_string()]).await;
        assert_eq!(summary.success, 1);
        assert!(summary.failed.is_empty());
        assert_eq!(provider.calls("MSFT"), 1);
        assert_eq!(state.cache.get("MSFT").unwrap().unwrap().record_count, 3);
    }
}
