//! SQLite database module: report ledger and queue storage

pub mod connection;
pub mod models;
mod migrations;
mod queue;
mod reports;

use crate::error::Result;
use crate::queue::QueueMessage;
use models::*;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// SQLite database wrapper
pub struct LedgerDb {
    conn: Mutex<Connection>,
}

impl LedgerDb {
    /// Open (or create) the ledger database
    pub fn new(path: &Path) -> Result<Self> {
        let conn = connection::create_connection(path)?;

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

    // ========== Report Ledger Methods ==========

    /// Create a report row unless one already exists for the key
    pub fn create(
        &self,
        report_id: i64,
        batch_no: i64,
        payload: &Portfolio,
    ) -> Result<(JobRecord, bool)> {
        let conn = self.conn.lock();
        reports::create_report(&conn, report_id, batch_no, payload)
    }

    /// Claim a QUEUED report for processing
    pub fn claim(&self, report_id: i64, batch_no: i64) -> Result<bool> {
        let conn = self.conn.lock();
        reports::claim_report(&conn, report_id, batch_no)
    }

    /// Set a report's status
    pub fn update_status(
        &self,
        report_id: i64,
        batch_no: i64,
        status: ReportStatus,
        s3_key: Option<&str>,
        error_msg: Option<&str>,
    ) -> Result<JobRecord> {
        let conn = self.conn.lock();
        reports::update_report_status(&conn, report_id, batch_no, status, s3_key, error_msg)
    }

    /// Dead-letter override to FAILED
    pub fn force_fail(
        &self,
        report_id: i64,
        batch_no: i64,
        error_msg: &str,
    ) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();
        reports::force_fail_report(&conn, report_id, batch_no, error_msg)
    }

    /// Get a single report
    pub fn get(&self, report_id: i64, batch_no: i64) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();
        reports::get_report(&conn, report_id, batch_no)
    }

    /// List all reports of a batch
    pub fn list_by_batch(&self, batch_no: i64) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();
        reports::list_reports_by_batch(&conn, batch_no)
    }

    /// List reports stuck in a status since before the given timestamp
    pub fn list_stale(&self, status: ReportStatus, updated_before: &str) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();
        reports::list_stale_reports(&conn, status, updated_before)
    }

    /// Status audit trail of a report
    pub fn history(&self, report_id: i64, batch_no: i64) -> Result<Vec<StatusLogEntry>> {
        let conn = self.conn.lock();
        reports::get_status_history(&conn, report_id, batch_no)
    }

    /// Delete a report and its audit trail
    pub fn delete(&self, report_id: i64, batch_no: i64) -> Result<bool> {
        let conn = self.conn.lock();
        reports::delete_report(&conn, report_id, batch_no)
    }

    // ========== Queue Methods ==========

    pub fn queue_send(&self, queue: &str, body: &str) -> Result<String> {
        let conn = self.conn.lock();
        queue::send_message(&conn, queue, body)
    }

    pub fn queue_receive(
        &self,
        queue: &str,
        max: usize,
        visibility_timeout: Duration,
        max_receive_count: u32,
        dead_letter_queue: Option<&str>,
    ) -> Result<Vec<QueueMessage>> {
        let conn = self.conn.lock();
        queue::receive_messages(
            &conn,
            queue,
            max,
            visibility_timeout.as_millis() as i64,
            max_receive_count,
            dead_letter_queue,
        )
    }

    pub fn queue_delete(&self, receipt_handle: &str) -> Result<bool> {
        let conn = self.conn.lock();
        queue::delete_message(&conn, receipt_handle)
    }

    pub fn queue_depth(&self, queue: &str) -> Result<i64> {
        let conn = self.conn.lock();
        queue::queue_depth(&conn, queue)
    }
}
