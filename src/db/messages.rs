use rusqlite::{params, OptionalExtension};

use super::*;

impl FarmDb {
    // =========================================================================
    // Raw messages
    // =========================================================================

    /// Insert a raw gateway message, keyed by the gateway's `message_id`.
    ///
    /// Returns `true` if the row was newly inserted, `false` if a message
    /// with the same identifier already exists (gateway retry). Safe under
    /// concurrent duplicate delivery — the UNIQUE constraint arbitrates.
    pub fn insert_raw_message(&self, msg: &DbRawMessage) -> Result<bool, String> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO raw_messages (
                    id, message_id, from_contact, body, message_type,
                    media_url, media_content_type, state, received_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.id,
                    msg.message_id,
                    msg.from_contact,
                    msg.body,
                    msg.message_type,
                    msg.media_url,
                    msg.media_content_type,
                    msg.state,
                    msg.received_at,
                ],
            )
            .map_err(|e| format!("Failed to insert raw message {}: {e}", msg.message_id))?;
        Ok(inserted == 1)
    }

    /// Fetch a raw message by its gateway identifier.
    pub fn get_raw_message(&self, message_id: &str) -> Result<Option<DbRawMessage>, String> {
        self.conn
            .query_row(
                "SELECT id, message_id, from_contact, body, message_type, media_url,
                        media_content_type, state, received_at, processed_at,
                        extracted_json, linked_activity_id
                 FROM raw_messages WHERE message_id = ?1",
                params![message_id],
                map_raw_message_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query raw message {}: {e}", message_id))
    }

    /// Record the extraction outcome: state becomes `processed` (the message
    /// was handled, whether or not anything was extracted).
    pub fn mark_message_processed(
        &self,
        message_id: &str,
        extracted_json: Option<&str>,
    ) -> Result<(), String> {
        let now = Self::now();
        self.conn
            .execute(
                "UPDATE raw_messages
                 SET state = ?1, processed_at = ?2, extracted_json = ?3
                 WHERE message_id = ?4",
                params![MSG_STATE_PROCESSED, now, extracted_json, message_id],
            )
            .map_err(|e| format!("Failed to mark message {} processed: {e}", message_id))?;
        Ok(())
    }

    /// Return a message to the retryable `failed` state after a storage fault.
    pub fn mark_message_failed(&self, message_id: &str) -> Result<(), String> {
        self.conn
            .execute(
                "UPDATE raw_messages SET state = ?1 WHERE message_id = ?2",
                params![MSG_STATE_FAILED, message_id],
            )
            .map_err(|e| format!("Failed to mark message {} failed: {e}", message_id))?;
        Ok(())
    }

    /// Link the activity created from this message.
    pub fn link_message_activity(
        &self,
        message_id: &str,
        activity_id: &str,
    ) -> Result<(), String> {
        self.conn
            .execute(
                "UPDATE raw_messages SET linked_activity_id = ?1 WHERE message_id = ?2",
                params![activity_id, message_id],
            )
            .map_err(|e| format!("Failed to link activity to message {}: {e}", message_id))?;
        Ok(())
    }

    /// Messages still in `received` or `failed` state, oldest first.
    /// The worker re-drives these after a crash or storage fault.
    pub fn get_unprocessed_messages(&self, limit: usize) -> Result<Vec<DbRawMessage>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, message_id, from_contact, body, message_type, media_url,
                        media_content_type, state, received_at, processed_at,
                        extracted_json, linked_activity_id
                 FROM raw_messages
                 WHERE state IN ('received', 'failed')
                 ORDER BY received_at
                 LIMIT ?1",
            )
            .map_err(|e| format!("Failed to prepare unprocessed query: {e}"))?;

        let rows = stmt
            .query_map(params![limit as i64], map_raw_message_row)
            .map_err(|e| format!("Failed to query unprocessed messages: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read message row: {e}"))?);
        }
        Ok(results)
    }
}

fn map_raw_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbRawMessage> {
    Ok(DbRawMessage {
        id: row.get(0)?,
        message_id: row.get(1)?,
        from_contact: row.get(2)?,
        body: row.get(3)?,
        message_type: row.get(4)?,
        media_url: row.get(5)?,
        media_content_type: row.get(6)?,
        state: row.get(7)?,
        received_at: row.get(8)?,
        processed_at: row.get(9)?,
        extracted_json: row.get(10)?,
        linked_activity_id: row.get(11)?,
    })
}
