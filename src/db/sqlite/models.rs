//! Ledger models

use crate::error::AppError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Report lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Created,
    Queued,
    InProgress,
    UploadStarted,
    Finished,
    Rejected,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Created => "CREATED",
            ReportStatus::Queued => "QUEUED",
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::UploadStarted => "UPLOAD_STARTED",
            ReportStatus::Finished => "FINISHED",
            ReportStatus::Rejected => "REJECTED",
            ReportStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Finished | ReportStatus::Rejected | ReportStatus::Failed
        )
    }

    /// Whether `next` is a legal forward move from this status.
    ///
    /// FAILED is reachable from every non-terminal status and from REJECTED,
    /// which is how the dead-letter reconciler finalizes rejected jobs.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        match (self, next) {
            (Created, Queued) => true,
            (Queued, InProgress) => true,
            (InProgress, UploadStarted) => true,
            (UploadStarted, Finished) => true,
            (InProgress | UploadStarted, Rejected) => true,
            (Finished | Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ReportStatus::Created),
            "QUEUED" => Ok(ReportStatus::Queued),
            "IN_PROGRESS" => Ok(ReportStatus::InProgress),
            "UPLOAD_STARTED" => Ok(ReportStatus::UploadStarted),
            "FINISHED" => Ok(ReportStatus::Finished),
            "REJECTED" => Ok(ReportStatus::Rejected),
            "FAILED" => Ok(ReportStatus::Failed),
            other => Err(AppError::Validation(format!("Unknown report status '{}'", other))),
        }
    }
}

impl ToSql for ReportStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReportStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: AppError| FromSqlError::Other(e.to_string().into()))
    }
}

/// A portfolio: ticker symbol -> positive share count.
///
/// Built only through validation, so a `Portfolio` in hand is always usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, i64>", into = "BTreeMap<String, i64>")]
pub struct Portfolio(BTreeMap<String, u32>);

impl Portfolio {
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn shares(&self, ticker: &str) -> Option<u32> {
        self.0.get(ticker).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(t, s)| (t.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && ticker.len() <= 16
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^' | '='))
}

impl TryFrom<BTreeMap<String, i64>> for Portfolio {
    type Error = AppError;

    fn try_from(raw: BTreeMap<String, i64>) -> Result<Self, Self::Error> {
        if raw.is_empty() {
            return Err(AppError::Validation("Portfolio has no positions".to_string()));
        }

        let mut positions = BTreeMap::new();
        for (ticker, shares) in raw {
            let ticker = ticker.trim().to_string();
            if !is_valid_ticker(&ticker) {
                return Err(AppError::Validation(format!("Invalid ticker symbol '{}'", ticker)));
            }
            let shares = u32::try_from(shares)
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Share count for {} must be a positive integer, got {}",
                        ticker, shares
                    ))
                })?;
            positions.insert(ticker, shares);
        }

        Ok(Portfolio(positions))
    }
}

impl From<Portfolio> for BTreeMap<String, i64> {
    fn from(portfolio: Portfolio) -> Self {
        portfolio
            .0
            .into_iter()
            .map(|(t, s)| (t, i64::from(s)))
            .collect()
    }
}

/// Ledger row for one report job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub report_id: i64,
    pub batch_no: i64,
    pub status: ReportStatus,
    pub s3_key: Option<String>,
    pub payload: Portfolio,
    pub error_msg: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Status audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: i64,
    pub report_id: i64,
    pub batch_no: i64,
    pub status: ReportStatus,
    pub error_msg: Option<String>,
    pub at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ReportStatus::Created,
            ReportStatus::Queued,
            ReportStatus::InProgress,
            ReportStatus::UploadStarted,
            ReportStatus::Finished,
            ReportStatus::Rejected,
            ReportStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ReportStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn test_transition_table() {
        use ReportStatus::*;
        assert!(Created.can_transition_to(Queued));
        assert!(Queued.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(UploadStarted));
        assert!(UploadStarted.can_transition_to(Finished));
        assert!(InProgress.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Failed));
        assert!(Queued.can_transition_to(Failed));

        assert!(!InProgress.can_transition_to(Queued));
        assert!(!Finished.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Rejected));
        assert!(!Failed.can_transition_to(Queued));
    }

    #[test]
    fn test_portfolio_validation() {
        let portfolio = Portfolio::try_from(raw(&[("AAPL", 9), ("SPY", 20), ("BRK.B", 2)])).unwrap();
        assert_eq!(portfolio.len(), 3);
        assert_eq!(portfolio.shares("AAPL"), Some(9));
        assert_eq!(portfolio.tickers().collect::<Vec<_>>(), vec!["AAPL", "BRK.B", "SPY"]);

        assert!(Portfolio::try_from(raw(&[])).is_err());
        assert!(Portfolio::try_from(raw(&[("AAPL", 0)])).is_err());
        assert!(Portfolio::try_from(raw(&[("AAPL", -3)])).is_err());
        assert!(Portfolio::try_from(raw(&[("aapl", 3)])).is_err());
        assert!(Portfolio::try_from(raw(&[("", 3)])).is_err());
    }

    #[test]
    fn test_portfolio_json_shape() {
        let portfolio: Portfolio = serde_json::from_str(r#"{"AAPL": 9, "SPY": 20}"#).unwrap();
        assert_eq!(serde_json::to_string(&portfolio).unwrap(), r#"{"AAPL":9,"SPY":20}"#);

        let invalid = serde_json::from_str::<Portfolio>(r#"{"AAPL": -1}"#);
        assert!(invalid.is_err());
    }
}
