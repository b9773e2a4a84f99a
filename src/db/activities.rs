use rusqlite::{params, OptionalExtension};

use super::*;

impl FarmDb {
    // =========================================================================
    // Activities
    // =========================================================================

    /// Insert an activity, idempotent on `source_message_id`.
    ///
    /// Returns `Some(id)` when the row was inserted, `None` when an activity
    /// for the same source message already exists. The UNIQUE constraint (not
    /// an in-process lock) arbitrates concurrent duplicate delivery, so this
    /// is safe across worker processes. Manual entries (NULL source) always
    /// insert.
    pub fn insert_activity(&self, activity: &DbActivity) -> Result<Option<String>, String> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO activities (
                    id, plot_id, activity_type, activity_date, cladodes_planted,
                    stations_planted, workers_count, hours_worked, reported_by,
                    report_method, notes, ai_extracted, ai_confidence,
                    source_message_id, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(source_message_id) DO NOTHING",
                params![
                    activity.id,
                    activity.plot_id,
                    activity.activity_type,
                    activity.activity_date,
                    activity.cladodes_planted,
                    activity.stations_planted,
                    activity.workers_count,
                    activity.hours_worked,
                    activity.reported_by,
                    activity.report_method,
                    activity.notes,
                    activity.ai_extracted as i32,
                    activity.ai_confidence,
                    activity.source_message_id,
                    activity.created_at,
                ],
            )
            .map_err(|e| format!("Failed to insert activity {}: {e}", activity.id))?;

        if inserted == 1 {
            Ok(Some(activity.id.clone()))
        } else {
            Ok(None)
        }
    }

    /// Fetch the activity created from a given source message, if any.
    pub fn get_activity_by_source(
        &self,
        source_message_id: &str,
    ) -> Result<Option<DbActivity>, String> {
        self.conn
            .query_row(
                &format!("{} WHERE source_message_id = ?1", SELECT_ACTIVITY),
                params![source_message_id],
                map_activity_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query activity for {}: {e}", source_message_id))
    }

    /// Activities in an inclusive date range, optionally filtered by plot,
    /// ordered by activity date.
    pub fn get_activities_in_range(
        &self,
        start_date: &str,
        end_date: &str,
        plot_id: Option<&str>,
    ) -> Result<Vec<DbActivity>, String> {
        let mut results = Vec::new();

        if let Some(plot) = plot_id {
            let mut stmt = self
                .conn
                .prepare(&format!(
                    "{} WHERE activity_date >= ?1 AND activity_date <= ?2 AND plot_id = ?3
                     ORDER BY activity_date",
                    SELECT_ACTIVITY
                ))
                .map_err(|e| format!("Failed to prepare activity range query: {e}"))?;
            let rows = stmt
                .query_map(params![start_date, end_date, plot], map_activity_row)
                .map_err(|e| format!("Failed to query activities: {e}"))?;
            for row in rows {
                results.push(row.map_err(|e| format!("Failed to read activity row: {e}"))?);
            }
        } else {
            let mut stmt = self
                .conn
                .prepare(&format!(
                    "{} WHERE activity_date >= ?1 AND activity_date <= ?2
                     ORDER BY activity_date",
                    SELECT_ACTIVITY
                ))
                .map_err(|e| format!("Failed to prepare activity range query: {e}"))?;
            let rows = stmt
                .query_map(params![start_date, end_date], map_activity_row)
                .map_err(|e| format!("Failed to query activities: {e}"))?;
            for row in rows {
                results.push(row.map_err(|e| format!("Failed to read activity row: {e}"))?);
            }
        }

        Ok(results)
    }

    /// Every activity row, for whole-farm aggregation.
    pub fn get_all_activities(&self) -> Result<Vec<DbActivity>, String> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY activity_date", SELECT_ACTIVITY))
            .map_err(|e| format!("Failed to prepare activity query: {e}"))?;

        let rows = stmt
            .query_map([], map_activity_row)
            .map_err(|e| format!("Failed to query activities: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read activity row: {e}"))?);
        }
        Ok(results)
    }
}

const SELECT_ACTIVITY: &str = "SELECT id, plot_id, activity_type, activity_date, cladodes_planted,
        stations_planted, workers_count, hours_worked, reported_by, report_method,
        notes, ai_extracted, ai_confidence, source_message_id, created_at
 FROM activities";

fn map_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbActivity> {
    Ok(DbActivity {
        id: row.get(0)?,
        plot_id: row.get(1)?,
        activity_type: row.get(2)?,
        activity_date: row.get(3)?,
        cladodes_planted: row.get(4)?,
        stations_planted: row.get(5)?,
        workers_count: row.get(6)?,
        hours_worked: row.get(7)?,
        reported_by: row.get(8)?,
        report_method: row.get(9)?,
        notes: row.get(10)?,
        ai_extracted: row.get::<_, i32>(11)? != 0,
        ai_confidence: row.get(12)?,
        source_message_id: row.get(13)?,
        created_at: row.get(14)?,
    })
}
