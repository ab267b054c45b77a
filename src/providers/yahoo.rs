//! Yahoo Finance chart API adapter

use crate::db::cache::models::DailyBar;
use crate::error::{AppError, Result};
use crate::providers::MarketDataProvider;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// `chart.error.code` for a symbol the API does not know
const NOT_FOUND_CODE: &str = "Not Found";

/// Yahoo chart endpoint (`/v8/finance/chart/{ticker}`)
pub struct YahooChartProvider {
    client: Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; portfolio-reports)")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Default)]
struct ChartMeta {
    /// Exchange offset from UTC, seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Deserialize, Default)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

/// Zip the column arrays into bars, dropping rows with missing fields
fn to_bars(result: ChartResult) -> Vec<DailyBar> {
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };
    let offset = result.meta.gmtoffset;

    result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(ts + offset, 0)?
                .format("%Y-%m-%d")
                .to_string();
            Some(DailyBar {
                date,
                open: (*quote.open.get(i)?)?,
                high: (*quote.high.get(i)?)?,
                low: (*quote.low.get(i)?)?,
                close: (*quote.close.get(i)?)?,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    async fn daily_history(&self, ticker: &str, period: &str) -> Result<Vec<DailyBar>> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(ticker)
        );

        tracing::debug!("Fetching {} history for {} from {}", period, ticker, url);

        let response = self
            .client
            .get(&url)
            .query(&[("range", period), ("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        // Yahoo reports unknown symbols as 404 with a chart.error body;
        // rate limits and outages come back as plain text
        let parsed: ChartResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(AppError::Provider(format!(
                    "{} returned {} for {}",
                    self.id(),
                    status,
                    ticker
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(err) = parsed.chart.error {
            if err.code == NOT_FOUND_CODE {
                tracing::debug!(
                    "{} has no {} data: {}",
                    ticker,
                    self.id(),
                    err.description.unwrap_or_default()
                );
                return Err(AppError::ticker_not_found(ticker));
            }
            return Err(AppError::Provider(format!(
                "{} for {}: {}",
                err.code,
                ticker,
                err.description.unwrap_or_default()
            )));
        }
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "{} returned {} for {}",
                self.id(),
                status,
                ticker
            )));
        }

        let bars = parsed
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(to_bars)
            .unwrap_or_default();

        if bars.is_empty() {
            return Err(AppError::ticker_not_found(ticker));
        }

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart_body() -> serde_json::Value {
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                    "timestamp": [1709301000, 1709560200, 1709646600],
                    "indicators": {
                        "quote": [{
                            "open": [179.5, 176.1, null],
                            "high": [180.5, 176.9, 172.0],
                            "low": [177.4, 173.8, 168.9],
                            "close": [179.6, 175.1, 170.1],
                            "volume": [73488000, 81510100, 95132400]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn test_daily_history_parses_bars() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(query_param("range", "2mo"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let bars = provider.daily_history("AAPL", "2mo").await.unwrap();

        // Third row has a null open and is dropped
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, "2024-03-01");
        assert_eq!(bars[0].close, 179.6);
        assert_eq!(bars[1].date, "2024-03-04");
        assert_eq!(bars[1].volume, 81510100);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/NOPE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "chart": {
                    "result": null,
                    "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let err = provider.daily_history("NOPE", "2mo").await.unwrap_err();
        assert!(matches!(err, AppError::TickerNotFound { ref ticker } if ticker == "NOPE"));
    }

    #[tokio::test]
    async fn test_empty_series_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chart": {
                    "result": [{"meta": {}, "indicators": {"quote": [{}]}}],
                    "error": null
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let err = provider.daily_history("AAPL", "2mo").await.unwrap_err();
        assert!(matches!(err, AppError::TickerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let err = provider.daily_history("AAPL", "2mo").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_a_missing_ticker() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let err = provider.daily_history("AAPL", "2mo").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
        assert!(!err.is_business());
    }

    #[tokio::test]
    async fn test_other_chart_errors_are_provider_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "chart": {
                    "result": null,
                    "error": {"code": "Internal Server Error", "description": "try again"}
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = YahooChartProvider::new(mock_server.uri()).unwrap();
        let err = provider.daily_history("AAPL", "2mo").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
    }
}
