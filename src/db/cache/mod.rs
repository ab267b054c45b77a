//! Market data cache, one SQLite file shared by every process

pub mod models;
mod migrations;

use crate::db::sqlite::connection::{begin_write, create_connection};
use crate::db::timestamp_now;
use crate::error::Result;
use models::{DailyBar, TickerCacheEntry};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Per-ticker price history cache
pub struct MarketCacheDb {
    conn: Mutex<Connection>,
}

impl MarketCacheDb {
    /// Open (or create) the cache database
    pub fn new(path: &Path) -> Result<Self> {
        let conn = create_connection(path)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    /// Cached entry for a ticker, if it was ever stored or marked
    pub fn get(&self, ticker: &str) -> Result<Option<TickerCacheEntry>> {
        let conn = self.conn.lock();

        // Header and bars from one snapshot
        let tx = conn.unchecked_transaction()?;

        let header = tx
            .query_row(
                "SELECT ticker, period, record_count, updated_at, is_valid
                 FROM ticker_cache WHERE ticker = ?1",
                params![ticker],
                |row| {
                    Ok(TickerCacheEntry {
                        ticker: row.get(0)?,
                        period: row.get(1)?,
                        bars: Vec::new(),
                        record_count: row.get(2)?,
                        updated_at: row.get(3)?,
                        is_valid: row.get(4)?,
                    })
                },
            )
            .optional()?;

        let Some(mut entry) = header else {
            return Ok(None);
        };

        {
            let mut stmt = tx.prepare(
                "SELECT date, open, high, low, close, volume
                 FROM ticker_bars
                 WHERE ticker = ?1
                 ORDER BY date ASC",
            )?;
            entry.bars = stmt
                .query_map(params![ticker], |row| {
                    Ok(DailyBar {
                        date: row.get(0)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }
        tx.commit()?;

        Ok(Some(entry))
    }

    /// Replace a ticker's whole entry; the result is marked valid.
    ///
    /// Bars are stored ascending by date, one per date (the last one wins).
    pub fn put(&self, ticker: &str, period: &str, bars: &[DailyBar]) -> Result<usize> {
        let bars = DailyBar::normalize(bars.to_vec());

        let conn = self.conn.lock();
        let tx = begin_write(&conn)?;

        tx.execute("DELETE FROM ticker_bars WHERE ticker = ?1", params![ticker])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO ticker_bars (ticker, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for bar in &bars {
                stmt.execute(params![
                    ticker, bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume,
                ])?;
            }
        }

        let count = bars.len();
        tx.execute(
            "INSERT INTO ticker_cache (ticker, period, record_count, updated_at, is_valid)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT (ticker) DO UPDATE SET
               period = excluded.period,
               record_count = excluded.record_count,
               updated_at = excluded.updated_at,
               is_valid = 1",
            params![ticker, period, count as i64, timestamp_now()],
        )?;

        tx.commit()?;

        tracing::info!("[cache] Cached {} - {} records", ticker, count);
        Ok(count)
    }

    /// Flag a ticker as unresolvable without deleting its history
    pub fn mark_invalid(&self, ticker: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO ticker_cache (ticker, period, record_count, updated_at, is_valid)
             VALUES (?1, '', 0, ?2, 0)
             ON CONFLICT (ticker) DO UPDATE SET
               is_valid = 0,
               updated_at = excluded.updated_at",
            params![ticker, timestamp_now()],
        )?;

        tracing::info!("[cache] Marked {} as invalid", ticker);
        Ok(())
    }
}
