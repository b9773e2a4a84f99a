use rusqlite::{params, OptionalExtension};

use super::*;

impl FarmDb {
    // =========================================================================
    // Plots
    // =========================================================================

    /// Exact lookup by plot code. Codes are stored normalized ("2A") and the
    /// extraction layer normalizes before calling, so this is a plain equality.
    pub fn find_plot_by_code(&self, plot_code: &str) -> Result<Option<DbPlot>, String> {
        self.conn
            .query_row(
                "SELECT id, plot_code, plot_name, area_ha, planned_density, status, created_at
                 FROM plots WHERE plot_code = ?1",
                params![plot_code],
                map_plot_row,
            )
            .optional()
            .map_err(|e| format!("Failed to query plot {}: {e}", plot_code))
    }

    /// Insert or update a plot, keyed by plot code.
    pub fn upsert_plot(&self, plot: &DbPlot) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO plots (id, plot_code, plot_name, area_ha, planned_density, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(plot_code) DO UPDATE SET
                    plot_name = excluded.plot_name,
                    area_ha = excluded.area_ha,
                    planned_density = excluded.planned_density,
                    status = excluded.status",
                params![
                    plot.id,
                    plot.plot_code,
                    plot.plot_name,
                    plot.area_ha,
                    plot.planned_density,
                    plot.status,
                    plot.created_at,
                ],
            )
            .map_err(|e| format!("Failed to upsert plot {}: {e}", plot.plot_code))?;
        Ok(())
    }

    /// All plots, ordered by code.
    pub fn list_plots(&self) -> Result<Vec<DbPlot>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, plot_code, plot_name, area_ha, planned_density, status, created_at
                 FROM plots ORDER BY plot_code",
            )
            .map_err(|e| format!("Failed to prepare plot list query: {e}"))?;

        let rows = stmt
            .query_map([], map_plot_row)
            .map_err(|e| format!("Failed to query plots: {e}"))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read plot row: {e}"))?);
        }
        Ok(results)
    }
}

fn map_plot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbPlot> {
    Ok(DbPlot {
        id: row.get(0)?,
        plot_code: row.get(1)?,
        plot_name: row.get(2)?,
        area_ha: row.get(3)?,
        planned_density: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}
