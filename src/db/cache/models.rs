//! Market cache models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trading date, `YYYY-MM-DD`
    pub date: String,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Volume")]
    pub volume: i64,
}

impl DailyBar {
    /// Ascending by date with one bar per date; later duplicates win
    pub fn normalize(bars: Vec<DailyBar>) -> Vec<DailyBar> {
        let by_date: BTreeMap<String, DailyBar> =
            bars.into_iter().map(|bar| (bar.date.clone(), bar)).collect();
        by_date.into_values().collect()
    }
}

/// Cached price history for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerCacheEntry {
    pub ticker: String,
    pub period: String,
    #[serde(rename = "records")]
    pub bars: Vec<DailyBar>,
    pub record_count: i64,
    pub updated_at: String,
    /// False marks a symbol known to be unresolvable
    pub is_valid: bool,
}

impl TickerCacheEntry {
    /// Bars usable for valuation: present and not flagged invalid
    pub fn usable_bars(&self) -> Option<&[DailyBar]> {
        if self.is_valid && !self.bars.is_empty() {
            Some(&self.bars)
        } else {
            None
        }
    }
}
