//! Persistence: SQLite ledger + queue, SQLite market data cache

pub mod cache;
pub mod sqlite;

use chrono::{SecondsFormat, Utc};

/// Fixed-precision UTC timestamp; lexical order matches chronological order.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
