//! SQLite connection utilities
//!
//! Every process (producer, workers, reconciler, API) opens its own
//! connection to the same files, so connections wait on locks instead of
//! failing and writers take the write lock up front.

use crate::error::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits for another process's lock
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection in WAL mode with a busy timeout
pub fn create_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

    Ok(conn)
}

/// Start a write transaction holding the write lock from `BEGIN`.
///
/// A deferred transaction that reads first cannot be upgraded while another
/// connection writes, and SQLite reports that as busy without waiting.
pub fn begin_write(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}
