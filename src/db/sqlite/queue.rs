//! Queue message storage
//!
//! At-least-once semantics: a received message stays hidden for the
//! visibility timeout and reappears unless deleted with its receipt handle.

use crate::db::sqlite::connection::begin_write;
use crate::error::Result;
use crate::queue::QueueMessage;
use rusqlite::{params, Connection};
use uuid::Uuid;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Store a message, returning its message id
pub fn send_message(conn: &Connection, queue: &str, body: &str) -> Result<String> {
    let message_id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO queue_messages (queue, message_id, body, receive_count, visible_after, sent_at)
         VALUES (?1, ?2, ?3, 0, 0, ?4)",
        params![queue, message_id, body, crate::db::timestamp_now()],
    )?;

    tracing::debug!("Enqueued message {} on {}", message_id, queue);
    Ok(message_id)
}

/// Receive up to `max` visible messages.
///
/// Messages that were already received `max_receive_count` times are moved
/// to `dead_letter_queue` with their raw body instead of being returned.
pub fn receive_messages(
    conn: &Connection,
    queue: &str,
    max: usize,
    visibility_timeout_ms: i64,
    max_receive_count: u32,
    dead_letter_queue: Option<&str>,
) -> Result<Vec<QueueMessage>> {
    let now = now_millis();

    let tx = begin_write(conn)?;
    let candidates: Vec<(i64, String, String, u32)> = {
        let mut stmt = tx.prepare(
            "SELECT id, message_id, body, receive_count FROM queue_messages
             WHERE queue = ?1 AND visible_after <= ?2
             ORDER BY id
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![queue, now, max as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    let mut messages = Vec::with_capacity(candidates.len());
    for (id, message_id, body, receive_count) in candidates {
        if let Some(dlq) = dead_letter_queue {
            if receive_count >= max_receive_count {
                tx.execute(
                    "UPDATE queue_messages
                     SET queue = ?2, receive_count = 0, visible_after = 0, receipt_handle = NULL
                     WHERE id = ?1",
                    params![id, dlq],
                )?;
                tracing::warn!(
                    "Message {} exceeded {} receives on {}, moved to {}",
                    message_id,
                    max_receive_count,
                    queue,
                    dlq
                );
                continue;
            }
        }

        let receipt_handle = Uuid::new_v4().to_string();
        tx.execute(
            "UPDATE queue_messages
             SET receive_count = receive_count + 1, visible_after = ?2, receipt_handle = ?3
             WHERE id = ?1",
            params![id, now + visibility_timeout_ms, receipt_handle],
        )?;

        messages.push(QueueMessage {
            message_id,
            receipt_handle,
            body,
            receive_count: receive_count + 1,
        });
    }
    tx.commit()?;

    Ok(messages)
}

/// Delete a received message. Returns false for stale receipt handles.
pub fn delete_message(conn: &Connection, receipt_handle: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM queue_messages WHERE receipt_handle = ?1",
        params![receipt_handle],
    )?;
    Ok(deleted > 0)
}

/// Number of messages stored on a queue, visible or not
pub fn queue_depth(conn: &Connection, queue: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM queue_messages WHERE queue = ?1",
        params![queue],
        |row| row.get(0),
    )?;
    Ok(count)
}
