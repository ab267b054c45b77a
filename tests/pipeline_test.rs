//! A whole batch through producer, worker and reconciler

use portfolio_reports::commands;
use portfolio_reports::config::Config;
use portfolio_reports::db::cache::MarketCacheDb;
use portfolio_reports::db::sqlite::models::{Portfolio, ReportStatus};
use portfolio_reports::db::sqlite::LedgerDb;
use portfolio_reports::providers::YahooChartProvider;
use portfolio_reports::queue::{JobQueue, SqliteQueue};
use portfolio_reports::render::PdfDashboardRenderer;
use portfolio_reports::services::reconciler_service::FAILED_MESSAGE;
use portfolio_reports::services::{DataSource, MarketDataService, ProducerService};
use portfolio_reports::state::AppState;
use portfolio_reports::storage::LocalObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chart(symbol: &str, base: f64) -> serde_json::Value {
    let days = 35;
    let timestamps: Vec<i64> = (0..days).map(|i| 1_704_067_200 + i * 86_400).collect();
    let closes: Vec<f64> = (0..days)
        .map(|i| base + (i as f64) + if i % 3 == 0 { 1.5 } else { 0.0 })
        .collect();

    serde_json::json!({
        "chart": {
            "result": [{
                "meta": {"symbol": symbol, "gmtoffset": 0},
                "timestamp": timestamps,
                "indicators": {
                    "quote": [{
                        "open": closes,
                        "high": closes,
                        "low": closes,
                        "close": closes,
                        "volume": vec![1_000_000_i64; days as usize]
                    }]
                }
            }],
            "error": null
        }
    })
}

async fn mock_market() -> MockServer {
    let server = MockServer::start().await;
    for (symbol, base) in [("AAPL", 180.0), ("MSFT", 400.0), ("SPY", 470.0)] {
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{}", symbol)))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(symbol, base)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        })))
        .mount(&server)
        .await;
    server
}

fn build_state(dir: &TempDir, market_url: &str) -> AppState {
    let data_dir = dir.path().to_string_lossy().to_string();
    let market_url = market_url.to_string();
    let config = Config::from_lookup(|key| match key {
        "DATA_DIR" => Some(data_dir.clone()),
        "MARKET_DATA_BASE_URL" => Some(market_url.clone()),
        _ => None,
    })
    .unwrap();

    let ledger = Arc::new(LedgerDb::new(&config.ledger_db_path).unwrap());
    let cache = Arc::new(MarketCacheDb::new(&config.market_db_path).unwrap());
    let jobs: Arc<dyn JobQueue> = Arc::new(
        SqliteQueue::new(ledger.clone(), &config.job_queue, Duration::from_secs(60))
            .with_dead_letter(&config.dead_letter_queue, config.max_receive_count),
    );
    let dead_letters: Arc<dyn JobQueue> = Arc::new(SqliteQueue::new(
        ledger.clone(),
        &config.dead_letter_queue,
        Duration::from_secs(60),
    ));
    let provider = Arc::new(YahooChartProvider::new(&config.market_data_base_url).unwrap());
    let storage = Arc::new(LocalObjectStore::new(dir.path().join("objects")));

    AppState::from_parts(
        config,
        ledger,
        cache,
        jobs,
        dead_letters,
        provider,
        storage,
        Arc::new(PdfDashboardRenderer::new()),
    )
}

fn portfolio(entries: &[(&str, i64)]) -> Portfolio {
    let raw: BTreeMap<String, i64> = entries.iter().map(|(t, s)| (t.to_string(), *s)).collect();
    Portfolio::try_from(raw).unwrap()
}

#[tokio::test]
async fn test_batch_end_to_end() {
    let market = mock_market().await;
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(&dir, &market.uri());

    let batch_no = 20240301093000;
    let portfolios = vec![
        portfolio(&[("AAPL", 9), ("MSFT", 13), ("SPY", 20)]),
        portfolio(&[("MSFT", 2), ("DELISTED", 4), ("SPY", 20)]),
        portfolio(&[("AAPL", 1)]),
    ];
    let submission = ProducerService::submit_batch(&state, batch_no, &portfolios)
        .await
        .unwrap();
    assert_eq!(submission.queued, 3);

    // Worker: two finish, one is rejected and dead-lettered
    assert_eq!(commands::work::poll_once(&state).await.unwrap(), 3);

    let finished = state.ledger.get(0, batch_no).unwrap().unwrap();
    assert_eq!(finished.status, ReportStatus::Finished);
    let key = finished.s3_key.unwrap();
    assert!(key.starts_with(&format!("reports/batch-{}/0/", batch_no)));
    let document = std::fs::read(dir.path().join("objects").join(&key)).unwrap();
    assert!(document.starts_with(b"%PDF-1.4"));

    let rejected = state.ledger.get(1, batch_no).unwrap().unwrap();
    assert_eq!(rejected.status, ReportStatus::Rejected);
    assert!(rejected.error_msg.unwrap().contains("DELISTED"));

    assert_eq!(
        state.ledger.get(2, batch_no).unwrap().unwrap().status,
        ReportStatus::Finished
    );

    // Prices were cached, the unknown ticker is flagged
    assert!(state.cache.get("MSFT").unwrap().unwrap().is_valid);
    assert!(!state.cache.get("DELISTED").unwrap().unwrap().is_valid);

    // Reconciler finalises the rejected job
    assert_eq!(commands::reconcile::poll_once(&state).await.unwrap(), 1);
    let failed = state.ledger.get(1, batch_no).unwrap().unwrap();
    assert_eq!(failed.status, ReportStatus::Failed);
    assert_eq!(failed.error_msg.as_deref(), Some(FAILED_MESSAGE));

    // Every message was acknowledged
    assert_eq!(commands::work::poll_once(&state).await.unwrap(), 0);
    assert_eq!(commands::reconcile::poll_once(&state).await.unwrap(), 0);

    let statuses: Vec<ReportStatus> = state
        .ledger
        .history(1, batch_no)
        .unwrap()
        .into_iter()
        .map(|entry| entry.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ReportStatus::Created,
            ReportStatus::Queued,
            ReportStatus::InProgress,
            ReportStatus::Rejected,
            ReportStatus::Failed,
        ]
    );
}

#[tokio::test]
async fn test_second_batch_is_served_from_cache() {
    let market = mock_market().await;
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(&dir, &market.uri());

    let holdings = vec![portfolio(&[("AAPL", 3), ("SPY", 20)])];
    ProducerService::submit_batch(&state, 1, &holdings).await.unwrap();
    commands::work::poll_once(&state).await.unwrap();
    let live_calls = market.received_requests().await.unwrap().len();
    assert_eq!(live_calls, 2);

    ProducerService::submit_batch(&state, 2, &holdings).await.unwrap();
    commands::work::poll_once(&state).await.unwrap();
    assert_eq!(market.received_requests().await.unwrap().len(), live_calls);
    assert_eq!(
        state.ledger.get(0, 2).unwrap().unwrap().status,
        ReportStatus::Finished
    );
}

#[tokio::test]
async fn test_rate_limited_ticker_is_retried_next_time() {
    let market = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&market)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart("AAPL", 180.0)))
        .mount(&market)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state = build_state(&dir, &market.uri());

    assert!(MarketDataService::fetch_one(&state, "AAPL").await.is_err());
    assert!(state.cache.get("AAPL").unwrap().is_none());

    let (bars, source) = MarketDataService::fetch_one(&state, "AAPL").await.unwrap();
    assert_eq!(source, DataSource::Live);
    assert_eq!(bars.len(), 35);
    assert_eq!(market.received_requests().await.unwrap().len(), 2);
}
