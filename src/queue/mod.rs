//! Job queue transport
//!
//! Delivery is at least once. Consumers must delete a message with its
//! receipt handle once handled, otherwise it reappears after the visibility
//! timeout.

use crate::db::sqlite::LedgerDb;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A delivered message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    /// Raw message body, as sent
    pub body: String,
    pub receive_count: u32,
}

/// Job message body: `{report_id, batch_no, payload: {ticker: shares}}`
///
/// The payload stays loosely typed here; it is validated into a
/// [`Portfolio`](crate::db::sqlite::models::Portfolio) once the job is claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub report_id: i64,
    pub batch_no: i64,
    #[serde(default)]
    pub payload: BTreeMap<String, i64>,
}

/// Queue transport trait
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue name, used in logs
    fn name(&self) -> &str;

    /// Send a message body, returning the message id
    async fn send(&self, body: &str) -> Result<String>;

    /// Receive up to `max` messages, hiding them for the visibility timeout
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a received message
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

/// Queue stored in the ledger database
pub struct SqliteQueue {
    db: Arc<LedgerDb>,
    name: String,
    dead_letter: Option<String>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl SqliteQueue {
    pub fn new(db: Arc<LedgerDb>, name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            db,
            name: name.into(),
            dead_letter: None,
            visibility_timeout,
            max_receive_count: 0,
        }
    }

    /// Redrive messages received `max_receive_count` times to `queue`
    pub fn with_dead_letter(mut self, queue: impl Into<String>, max_receive_count: u32) -> Self {
        self.dead_letter = Some(queue.into());
        self.max_receive_count = max_receive_count;
        self
    }

    /// Messages currently stored on this queue, visible or not
    pub fn depth(&self) -> Result<i64> {
        self.db.queue_depth(&self.name)
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str) -> Result<String> {
        self.db.queue_send(&self.name, body)
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>> {
        self.db.queue_receive(
            &self.name,
            max,
            self.visibility_timeout,
            self.max_receive_count,
            self.dead_letter.as_deref(),
        )
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        if !self.db.queue_delete(receipt_handle)? {
            tracing::warn!(
                "Receipt handle {} on {} is stale, message was not deleted",
                receipt_handle,
                self.name
            );
        }
        Ok(())
    }
}
