use rusqlite::{params, OptionalExtension};

use super::*;

/// What a metric-rule upsert actually did to the alerts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertUpsertOutcome {
    Created,
    Refreshed,
    /// Row exists but is acknowledged/resolved — re-evaluation leaves it alone.
    Untouched,
}

impl FarmDb {
    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert an issue-triggered alert, keyed by its dedup fingerprint.
    ///
    /// Returns `Some(id)` when inserted, `None` when an alert for the same
    /// (type, plot, activity) fingerprint already exists — a repeat
    /// observation never creates a second alert.
    pub fn insert_issue_alert(&self, alert: &DbAlert) -> Result<Option<String>, String> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO alerts (
                    id, rule_key, alert_type, severity, title, description,
                    recommendation, related_plot_id, related_activity_id, status,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(rule_key) DO NOTHING",
                params![
                    alert.id,
                    alert.rule_key,
                    alert.alert_type,
                    alert.severity,
                    alert.title,
                    alert.description,
                    alert.recommendation,
                    alert.related_plot_id,
                    alert.related_activity_id,
                    alert.status,
                    alert.created_at,
                    alert.updated_at,
                ],
            )
            .map_err(|e| format!("Failed to insert issue alert {}: {e}", alert.rule_key))?;

        if inserted == 1 {
            Ok(Some(alert.id.clone()))
        } else {
            Ok(None)
        }
    }

    /// Insert-or-refresh a metric-triggered alert, keyed by its rule id.
    ///
    /// No existing row → insert with the draft's initial status. Existing
    /// active row → refresh severity/description/recommendation in place.
    /// Existing acknowledged or resolved row → untouched (the lifecycle only
    /// moves forward; re-evaluation never reactivates).
    pub fn upsert_metric_alert(&self, draft: &DbAlert) -> Result<AlertUpsertOutcome, String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM alerts WHERE rule_key = ?1",
                params![draft.rule_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("Failed to query alert {}: {e}", draft.rule_key))?;

        match existing.as_deref() {
            None => {
                self.conn
                    .execute(
                        "INSERT INTO alerts (
                            id, rule_key, alert_type, severity, title, description,
                            recommendation, related_plot_id, related_activity_id,
                            status, acknowledged_at, created_at, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        params![
                            draft.id,
                            draft.rule_key,
                            draft.alert_type,
                            draft.severity,
                            draft.title,
                            draft.description,
                            draft.recommendation,
                            draft.related_plot_id,
                            draft.related_activity_id,
                            draft.status,
                            // Pre-acknowledged alerts (achievements) get their
                            // acknowledgement stamped at creation.
                            if draft.status == ALERT_STATUS_ACKNOWLEDGED {
                                Some(draft.updated_at.clone())
                            } else {
                                None
                            },
                            draft.created_at,
                            draft.updated_at,
                        ],
                    )
                    .map_err(|e| format!("Failed to insert alert {}: {e}", draft.rule_key))?;
                Ok(AlertUpsertOutcome::Created)
            }
            Some(ALERT_STATUS_ACTIVE) => {
                self.conn
                    .execute(
                        "UPDATE alerts SET
                            severity = ?1, title = ?2, description = ?3,
                            recommendation = ?4, updated_at = ?5
                         WHERE rule_key = ?6 AND status = 'active'",
                        params![
                            draft.severity,
                            draft.title,
                            draft.description,
                            draft.recommendation,
                            draft.updated_at,
                            draft.rule_key,
                        ],
                    )
                    .map_err(|e| format!("Failed to refresh alert {}: {e}", draft.rule_key))?;
                Ok(AlertUpsertOutcome::Refreshed)
            }
            Some(_) => Ok(AlertUpsertOutcome::Untouched),
        }
    }

    /// Resolve the active alert for a rule that no longer fires. Acknowledged
    /// alerts stay with the operator; only active ones auto-resolve.
    pub fn resolve_metric_alert_if_active(&self, rule_key: &str) -> Result<bool, String> {
        let now = Self::now();
        let updated = self
            .conn
            .execute(
                "UPDATE alerts
                 SET status = 'resolved', resolved_at = ?1, updated_at = ?1
                 WHERE rule_key = ?2 AND status = 'active'",
                params![now, rule_key],
            )
            .map_err(|e| format!("Failed to auto-resolve alert {}: {e}", rule_key))?;
        Ok(updated == 1)
    }

    /// Forward-only transition: active → acknowledged.
    /// Returns false when the alert is not currently active.
    pub fn acknowledge_alert(&self, alert_id: &str) -> Result<bool, String> {
        let now = Self::now();
        let updated = self
            .conn
            .execute(
                "UPDATE alerts
                 SET status = 'acknowledged', acknowledged_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'active'",
                params![now, alert_id],
            )
            .map_err(|e| format!("Failed to acknowledge alert {}: {e}", alert_id))?;
        Ok(updated == 1)
    }

    /// Forward-only transition: active/acknowledged → resolved.
    /// Returns false when the alert is already resolved.
    pub fn resolve_alert(&self, alert_id: &str) -> Result<bool, String> {
        let now = Self::now();
        let updated = self
            .conn
            .execute(
                "UPDATE alerts
                 SET status = 'resolved', resolved_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status IN ('active', 'acknowledged')",
                params![now, alert_id],
            )
            .map_err(|e| format!("Failed to resolve alert {}: {e}", alert_id))?;
        Ok(updated == 1)
    }

    /// Fetch one alert by id.
    pub fn get_alert(&self, alert_id: &str) -> Result<Option<DbAlert>, String> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_ALERT),
                params![alert_id],
                map_alert_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query alert {}: {e}", alert_id))
    }

    /// Fetch one alert by its stable rule key.
    pub fn get_alert_by_rule_key(&self, rule_key: &str) -> Result<Option<DbAlert>, String> {
        self.conn
            .query_row(
                &format!("{} WHERE rule_key = ?1", SELECT_ALERT),
                params![rule_key],
                map_alert_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query alert {}: {e}", rule_key))
    }

    /// Active alerts, most severe first, then newest.
    pub fn get_active_alerts(&self) -> Result<Vec<DbAlert>, String> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE status = 'active'
                 ORDER BY CASE severity
                     WHEN 'critical' THEN 0
                     WHEN 'high' THEN 1
                     WHEN 'medium' THEN 2
                     ELSE 3
                 END, created_at DESC",
                SELECT_ALERT
            ))
            .map_err(|e| format!("Failed to prepare alert query: {e}"))?;

        let rows = stmt
            .query_map([], map_alert_row)
            .map_err(|e| format!("Failed to query alerts: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read alert row: {e}"))?);
        }
        Ok(results)
    }
}

const SELECT_ALERT: &str = "SELECT id, rule_key, alert_type, severity, title, description, recommendation,
        related_plot_id, related_activity_id, status, acknowledged_at, resolved_at,
        created_at, updated_at
 FROM alerts";

fn map_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbAlert> {
    Ok(DbAlert {
        id: row.get(0)?,
        rule_key: row.get(1)?,
        alert_type: row.get(2)?,
        severity: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        recommendation: row.get(6)?,
        related_plot_id: row.get(7)?,
        related_activity_id: row.get(8)?,
        status: row.get(9)?,
        acknowledged_at: row.get(10)?,
        resolved_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
