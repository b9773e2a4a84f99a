use rusqlite::{params, OptionalExtension};

use super::*;

impl FarmDb {
    // =========================================================================
    // Field observations
    // =========================================================================

    /// Insert a field observation. One row per issue entry in the extraction.
    pub fn insert_observation(&self, obs: &DbObservation) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO field_observations (
                    id, activity_id, plot_id, observation_date, observation_type,
                    severity, description, action_required, ai_detected, status,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    obs.id,
                    obs.activity_id,
                    obs.plot_id,
                    obs.observation_date,
                    obs.observation_type,
                    obs.severity,
                    obs.description,
                    obs.action_required,
                    obs.ai_detected as i32,
                    obs.status,
                    obs.created_at,
                ],
            )
            .map_err(|e| format!("Failed to insert observation {}: {e}", obs.id))?;
        Ok(())
    }

    /// Mark an observation resolved. Returns false if it was already resolved
    /// (or does not exist).
    pub fn resolve_observation(&self, observation_id: &str) -> Result<bool, String> {
        let now = Self::now();
        let updated = self
            .conn
            .execute(
                "UPDATE field_observations
                 SET status = 'resolved', resolved_at = ?1
                 WHERE id = ?2 AND status = 'open'",
                params![now, observation_id],
            )
            .map_err(|e| format!("Failed to resolve observation {}: {e}", observation_id))?;
        Ok(updated == 1)
    }

    /// Fetch one observation by id.
    pub fn get_observation(&self, observation_id: &str) -> Result<Option<DbObservation>, String> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_OBSERVATION),
                params![observation_id],
                map_observation_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query observation {}: {e}", observation_id))
    }

    /// All observations tied to an activity, in insertion order.
    pub fn get_observations_for_activity(
        &self,
        activity_id: &str,
    ) -> Result<Vec<DbObservation>, String> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE activity_id = ?1 ORDER BY created_at, id",
                SELECT_OBSERVATION
            ))
            .map_err(|e| format!("Failed to prepare observation query: {e}"))?;

        let rows = stmt
            .query_map(params![activity_id], map_observation_row)
            .map_err(|e| format!("Failed to query observations: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read observation row: {e}"))?);
        }
        Ok(results)
    }
}

const SELECT_OBSERVATION: &str = "SELECT id, activity_id, plot_id, observation_date, observation_type, severity,
        description, action_required, ai_detected, status, resolved_at, created_at
 FROM field_observations";

fn map_observation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbObservation> {
    Ok(DbObservation {
        id: row.get(0)?,
        activity_id: row.get(1)?,
        plot_id: row.get(2)?,
        observation_date: row.get(3)?,
        observation_type: row.get(4)?,
        severity: row.get(5)?,
        description: row.get(6)?,
        action_required: row.get(7)?,
        ai_detected: row.get::<_, i32>(8)? != 0,
        status: row.get(9)?,
        resolved_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}
