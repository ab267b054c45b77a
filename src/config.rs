//! Process configuration loaded from the environment

use crate::error::{AppError, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where rendered documents are uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Files under a local directory
    Local { root: PathBuf },
    /// S3 (or S3-compatible) bucket
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: String,
        access_key: String,
        secret_key: String,
    },
}

/// Daily market data refresh schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub ledger_db_path: PathBuf,
    pub market_db_path: PathBuf,

    pub job_queue: String,
    pub dead_letter_queue: String,
    pub visibility_timeout: Duration,
    pub max_receive_count: u32,
    pub receive_batch_size: usize,
    pub poll_interval: Duration,

    pub fetch_concurrency: usize,
    pub benchmark_ticker: String,
    pub history_period: String,
    pub invalid_ticker_ttl: Duration,
    pub market_data_base_url: String,

    pub storage: StorageBackend,

    pub api_host: String,
    pub api_port: u16,

    pub refresh: RefreshSchedule,
}

impl Config {
    /// Load configuration from environment variables, applying defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let ledger_db_path = get("LEDGER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("reports.db"));
        let market_db_path = get("MARKET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("markets.db"));

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageBackend::Local {
                root: get("LOCAL_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("objects")),
            },
            "s3" => StorageBackend::S3 {
                bucket: get("S3_BUCKET_NAME").ok_or_else(|| {
                    AppError::Config("S3_BUCKET_NAME is required for the s3 backend".to_string())
                })?,
                endpoint: get("S3_ENDPOINT"),
                region: get("AWS_REGION").unwrap_or_else(|| "ap-south-2".to_string()),
                access_key: get("AWS_ACCESS_KEY").ok_or_else(|| {
                    AppError::Config("AWS_ACCESS_KEY is required for the s3 backend".to_string())
                })?,
                secret_key: get("AWS_SECRET_KEY").ok_or_else(|| {
                    AppError::Config("AWS_SECRET_KEY is required for the s3 backend".to_string())
                })?,
            },
            other => {
                return Err(AppError::Config(format!(
                    "Unknown STORAGE_BACKEND '{}', expected 'local' or 's3'",
                    other
                )))
            }
        };

        let timezone_name = get("REFRESH_TIMEZONE").unwrap_or_else(|| "Asia/Kolkata".to_string());
        let timezone = Tz::from_str(&timezone_name)
            .map_err(|e| AppError::Config(format!("Invalid REFRESH_TIMEZONE: {}", e)))?;

        let refresh = RefreshSchedule {
            enabled: parse_or(&get, "REFRESH_ENABLED", true)?,
            hour: parse_or(&get, "REFRESH_HOUR", 6)?,
            minute: parse_or(&get, "REFRESH_MINUTE", 0)?,
            timezone,
        };
        if refresh.hour > 23 || refresh.minute > 59 {
            return Err(AppError::Config(format!(
                "Invalid refresh time {:02}:{:02}",
                refresh.hour, refresh.minute
            )));
        }

        let fetch_concurrency: usize = parse_or(&get, "FETCH_CONCURRENCY", 16)?;
        if fetch_concurrency == 0 {
            return Err(AppError::Config("FETCH_CONCURRENCY must be at least 1".to_string()));
        }

        Ok(Self {
            ledger_db_path,
            market_db_path,
            data_dir,
            job_queue: get("JOB_QUEUE").unwrap_or_else(|| "report-jobs".to_string()),
            dead_letter_queue: get("DEAD_LETTER_QUEUE")
                .unwrap_or_else(|| "report-jobs-dlq".to_string()),
            visibility_timeout: Duration::from_secs(parse_or(&get, "VISIBILITY_TIMEOUT_SECS", 300)?),
            max_receive_count: parse_or(&get, "MAX_RECEIVE_COUNT", 3)?,
            receive_batch_size: parse_or(&get, "RECEIVE_BATCH_SIZE", 10)?,
            poll_interval: Duration::from_millis(parse_or(&get, "POLL_INTERVAL_MS", 1000)?),
            fetch_concurrency,
            benchmark_ticker: get("BENCHMARK_TICKER").unwrap_or_else(|| "SPY".to_string()),
            history_period: get("HISTORY_PERIOD").unwrap_or_else(|| "2mo".to_string()),
            invalid_ticker_ttl: Duration::from_secs(
                parse_or::<u64, _>(&get, "INVALID_TICKER_TTL_HOURS", 24)? * 3600,
            ),
            market_data_base_url: get("MARKET_DATA_BASE_URL")
                .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string()),
            storage,
            api_host: get("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: parse_or(&get, "API_PORT", 8090)?,
            refresh,
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
