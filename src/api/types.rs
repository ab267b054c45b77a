//! Status API response types

use crate::db::cache::models::TickerCacheEntry;
use crate::db::sqlite::models::{JobRecord, StatusLogEntry};
use serde::Serialize;

/// Standard API response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_with_message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }
}

/// Reports of one batch, with per-status counts
#[derive(Debug, Serialize)]
pub struct BatchView {
    pub batch_no: i64,
    pub total: usize,
    pub counts: std::collections::BTreeMap<String, usize>,
    pub reports: Vec<JobRecord>,
}

/// One report with its status trail
#[derive(Debug, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: JobRecord,
    pub history: Vec<StatusLogEntry>,
}

/// Cache header of a ticker, bars omitted
#[derive(Debug, Serialize)]
pub struct TickerView {
    pub ticker: String,
    pub period: String,
    pub record_count: i64,
    pub updated_at: String,
    pub is_valid: bool,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

impl From<TickerCacheEntry> for TickerView {
    fn from(entry: TickerCacheEntry) -> Self {
        Self {
            first_date: entry.bars.first().map(|b| b.date.clone()),
            last_date: entry.bars.last().map(|b| b.date.clone()),
            ticker: entry.ticker,
            period: entry.period,
            record_count: entry.record_count,
            updated_at: entry.updated_at,
            is_valid: entry.is_valid,
        }
    }
}
