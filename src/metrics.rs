//! Metrics aggregation over activity rows.
//!
//! Pure computation — metrics are derived, recomputable, and never stored.
//! Anything that needs a figure (dashboards, the alert rules) recomputes it
//! from the activity rows at call time; there is no snapshot table to go
//! stale.
//!
//! Quantities default to 0 when the source field is null. Days with no
//! activity simply don't appear in the breakdown — no interpolation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::EstimateConfig;
use crate::db::DbActivity;

/// One day's accumulated figures.
#[derive(Debug, Clone, Serialize)]
pub struct DailyBreakdown {
    pub date: String,
    pub cladodes_planted: i64,
    pub workers: i64,
    pub hours: f64,
    pub activities_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsTotals {
    pub total_planted: i64,
    pub total_worker_hours: f64,
    pub total_activities: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsAverages {
    /// Cladodes per day, over days that actually planted.
    pub daily_planting: f64,
    /// Cladodes per worker-day.
    pub productivity_per_worker: f64,
    pub hours_per_day: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub planting_rate_change_percent: f64,
    pub direction: TrendDirection,
}

/// Derived figures for a date range. Identity is the query parameters —
/// rebuild it whenever you need it.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub period_start: String,
    pub period_end: String,
    pub days: usize,
    pub daily_breakdown: Vec<DailyBreakdown>,
    pub totals: MetricsTotals,
    pub averages: MetricsAverages,
    pub trends: Trend,
}

/// Compute range metrics from activity rows already filtered to the range.
///
/// Planting activities accumulate cladodes, workers, and hours into their
/// day bucket; every activity counts toward the day's activity count. A day
/// reporting no hours is costed at `standard_workday_hours`.
pub fn compute_metrics(
    activities: &[DbActivity],
    period_start: &str,
    period_end: &str,
    standard_workday_hours: f64,
) -> MetricsSnapshot {
    let mut buckets: BTreeMap<String, DailyBreakdown> = BTreeMap::new();

    for activity in activities {
        let day = buckets
            .entry(activity.activity_date.clone())
            .or_insert_with(|| DailyBreakdown {
                date: activity.activity_date.clone(),
                cladodes_planted: 0,
                workers: 0,
                hours: 0.0,
                activities_count: 0,
            });

        if activity.activity_type == "planting" {
            day.cladodes_planted += activity.cladodes_planted.unwrap_or(0);
            day.workers += activity.workers_count.unwrap_or(0);
            day.hours += activity.hours_worked.unwrap_or(0.0);
        }
        day.activities_count += 1;
    }

    let daily_breakdown: Vec<DailyBreakdown> = buckets.into_values().collect();

    let mut total_planted = 0i64;
    let mut total_worker_hours = 0.0f64;
    let mut total_activities = 0i64;
    for day in &daily_breakdown {
        total_planted += day.cladodes_planted;
        let hours = if day.hours > 0.0 {
            day.hours
        } else {
            standard_workday_hours
        };
        total_worker_hours += day.workers as f64 * hours;
        total_activities += day.activities_count;
    }

    let days_with_planting = daily_breakdown
        .iter()
        .filter(|d| d.cladodes_planted > 0)
        .count();
    let daily_planting = if days_with_planting > 0 {
        (total_planted as f64 / days_with_planting as f64).round()
    } else {
        0.0
    };

    let total_worker_days: i64 = daily_breakdown.iter().map(|d| d.workers).sum();
    let productivity_per_worker = if total_worker_days > 0 {
        (total_planted as f64 / total_worker_days as f64).round()
    } else {
        0.0
    };

    let hours_per_day = if days_with_planting > 0 {
        (total_worker_hours / days_with_planting as f64).round()
    } else {
        0.0
    };

    MetricsSnapshot {
        period_start: period_start.to_string(),
        period_end: period_end.to_string(),
        days: daily_breakdown.len(),
        trends: compute_trend(&daily_breakdown),
        totals: MetricsTotals {
            total_planted,
            total_worker_hours,
            total_activities,
        },
        averages: MetricsAverages {
            daily_planting,
            productivity_per_worker,
            hours_per_day,
        },
        daily_breakdown,
    }
}

/// Midpoint-split trend: mean of the second half of the day sequence vs the
/// first. A zero first-half mean reports 0% (no meaningful baseline).
fn compute_trend(daily: &[DailyBreakdown]) -> Trend {
    let midpoint = daily.len() / 2;
    let (first, second) = daily.split_at(midpoint);

    let mean = |half: &[DailyBreakdown]| -> f64 {
        if half.is_empty() {
            return 0.0;
        }
        half.iter().map(|d| d.cladodes_planted as f64).sum::<f64>() / half.len() as f64
    };

    let first_mean = mean(first);
    let second_mean = mean(second);

    let change = if first_mean > 0.0 {
        (((second_mean - first_mean) / first_mean) * 100.0).round()
    } else {
        0.0
    };

    Trend {
        planting_rate_change_percent: change,
        direction: if change >= 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        },
    }
}

/// Answer a metrics query: fetch the activity rows for the range (optionally
/// filtered by plot) and aggregate them. Dates are inclusive ISO `YYYY-MM-DD`.
pub fn query_metrics(
    db: &crate::db::FarmDb,
    start_date: &str,
    end_date: &str,
    plot_id: Option<&str>,
    standard_workday_hours: f64,
) -> Result<MetricsSnapshot, String> {
    let activities = db.get_activities_in_range(start_date, end_date, plot_id)?;
    Ok(compute_metrics(
        &activities,
        start_date,
        end_date,
        standard_workday_hours,
    ))
}

// ---------------------------------------------------------------------------
// Farm overview
// ---------------------------------------------------------------------------

/// Whole-farm dashboard figures; input to the metric alert rules.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewMetrics {
    pub total_cladodes: i64,
    pub total_stations: i64,
    /// Average cladodes per station.
    pub avg_stack_height: f64,
    /// Cladodes per reporting day over the trailing week (all-time when the
    /// week is empty).
    pub avg_daily_rate: f64,
    pub area_planted_ha: f64,
    pub planting_days: usize,
}

/// Compute the farm overview from all activity rows.
pub fn compute_overview(
    activities: &[DbActivity],
    today: NaiveDate,
    estimates: &EstimateConfig,
) -> OverviewMetrics {
    // Only rows that actually planted something count here
    let planting: Vec<&DbActivity> = activities
        .iter()
        .filter(|a| a.cladodes_planted.unwrap_or(0) > 0 || a.stations_planted.unwrap_or(0) > 0)
        .collect();

    let total_cladodes: i64 = planting.iter().map(|a| a.cladodes_planted.unwrap_or(0)).sum();
    let total_stations: i64 = planting.iter().map(|a| a.stations_planted.unwrap_or(0)).sum();

    // Stack height: mean of per-activity ratios where both quantities were
    // reported, else the totals ratio.
    let ratios: Vec<f64> = planting
        .iter()
        .filter_map(|a| {
            let cladodes = a.cladodes_planted.unwrap_or(0);
            let stations = a.stations_planted.unwrap_or(0);
            if cladodes > 0 && stations > 0 {
                Some(cladodes as f64 / stations as f64)
            } else {
                None
            }
        })
        .collect();
    let avg_stack_height = if !ratios.is_empty() {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    } else if total_stations > 0 {
        total_cladodes as f64 / total_stations as f64
    } else {
        0.0
    };

    // Trailing-week rate, falling back to the all-time per-report average
    let week_ago = (today - chrono::Duration::days(7)).format("%Y-%m-%d").to_string();
    let recent: Vec<&&DbActivity> = planting
        .iter()
        .filter(|a| a.activity_date >= week_ago)
        .collect();
    let avg_daily_rate = if !recent.is_empty() {
        (recent
            .iter()
            .map(|a| a.cladodes_planted.unwrap_or(0))
            .sum::<i64>() as f64
            / recent.len() as f64)
            .round()
    } else if !planting.is_empty() {
        (total_cladodes as f64 / planting.len() as f64).round()
    } else {
        0.0
    };

    let area_planted_ha = estimate_area_planted(
        total_stations,
        total_cladodes,
        avg_stack_height,
        estimates.stations_per_ha,
    );

    OverviewMetrics {
        total_cladodes,
        total_stations,
        avg_stack_height,
        avg_daily_rate,
        area_planted_ha,
        planting_days: planting.len(),
    }
}

/// Area from station counts when available; otherwise estimate the station
/// count from cladodes ÷ stack height; 0 when neither is known.
fn estimate_area_planted(
    total_stations: i64,
    total_cladodes: i64,
    avg_stack_height: f64,
    stations_per_ha: f64,
) -> f64 {
    if stations_per_ha <= 0.0 {
        return 0.0;
    }
    let area = if total_stations > 0 {
        total_stations as f64 / stations_per_ha
    } else if total_cladodes > 0 && avg_stack_height > 0.0 {
        (total_cladodes as f64 / avg_stack_height) / stations_per_ha
    } else {
        return 0.0;
    };
    (area * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbActivity;

    fn activity(
        id: &str,
        kind: &str,
        date: &str,
        cladodes: Option<i64>,
        stations: Option<i64>,
        workers: Option<i64>,
        hours: Option<f64>,
    ) -> DbActivity {
        DbActivity {
            id: id.to_string(),
            plot_id: "p1".to_string(),
            activity_type: kind.to_string(),
            activity_date: date.to_string(),
            cladodes_planted: cladodes,
            stations_planted: stations,
            workers_count: workers,
            hours_worked: hours,
            reported_by: None,
            report_method: "whatsapp".to_string(),
            notes: None,
            ai_extracted: true,
            ai_confidence: Some(0.9),
            source_message_id: Some(format!("SM-{}", id)),
            created_at: "2026-02-10T08:00:00Z".to_string(),
        }
    }

    fn estimates() -> EstimateConfig {
        EstimateConfig::default()
    }

    #[test]
    fn test_empty_range() {
        let snapshot = compute_metrics(&[], "2026-02-01", "2026-02-28", 8.0);
        assert_eq!(snapshot.days, 0);
        assert_eq!(snapshot.totals.total_planted, 0);
        assert_eq!(snapshot.averages.daily_planting, 0.0);
        assert_eq!(snapshot.trends.planting_rate_change_percent, 0.0);
        assert_eq!(snapshot.trends.direction, TrendDirection::Up);
    }

    #[test]
    fn test_daily_bucketing_by_kind() {
        let activities = vec![
            activity("a1", "planting", "2026-02-10", Some(400), None, Some(6), Some(8.0)),
            activity("a2", "planting", "2026-02-10", Some(200), None, Some(3), Some(4.0)),
            // Inspection counts toward activities, not quantities
            activity("a3", "inspection", "2026-02-10", None, None, Some(2), None),
        ];

        let snapshot = compute_metrics(&activities, "2026-02-01", "2026-02-28", 8.0);
        assert_eq!(snapshot.days, 1);
        let day = &snapshot.daily_breakdown[0];
        assert_eq!(day.cladodes_planted, 600);
        assert_eq!(day.workers, 9);
        assert_eq!(day.hours, 12.0);
        assert_eq!(day.activities_count, 3);
    }

    #[test]
    fn test_worker_hours_default_workday() {
        // No hours reported → the day is costed at the standard 8-hour day
        let activities = vec![activity(
            "a1", "planting", "2026-02-10", Some(400), None, Some(6), None,
        )];
        let snapshot = compute_metrics(&activities, "2026-02-01", "2026-02-28", 8.0);
        assert_eq!(snapshot.totals.total_worker_hours, 48.0);
    }

    #[test]
    fn test_daily_average_ignores_non_planting_days() {
        let activities = vec![
            activity("a1", "planting", "2026-02-10", Some(600), None, Some(6), Some(8.0)),
            activity("a2", "planting", "2026-02-11", Some(400), None, Some(5), Some(8.0)),
            activity("a3", "weeding", "2026-02-12", None, None, Some(4), None),
        ];

        let snapshot = compute_metrics(&activities, "2026-02-01", "2026-02-28", 8.0);
        // 1000 over 2 planting days, not 3 calendar days
        assert_eq!(snapshot.averages.daily_planting, 500.0);
        // 1000 cladodes over 11 worker-days
        assert_eq!(snapshot.averages.productivity_per_worker, 91.0);
    }

    #[test]
    fn test_trend_up_and_down() {
        let up = vec![
            activity("a1", "planting", "2026-02-10", Some(200), None, Some(5), Some(8.0)),
            activity("a2", "planting", "2026-02-11", Some(300), None, Some(5), Some(8.0)),
            activity("a3", "planting", "2026-02-12", Some(500), None, Some(5), Some(8.0)),
            activity("a4", "planting", "2026-02-13", Some(700), None, Some(5), Some(8.0)),
        ];
        let snapshot = compute_metrics(&up, "2026-02-01", "2026-02-28", 8.0);
        // first half mean 250, second half mean 600 → +140%
        assert_eq!(snapshot.trends.planting_rate_change_percent, 140.0);
        assert_eq!(snapshot.trends.direction, TrendDirection::Up);

        let down = vec![
            activity("a1", "planting", "2026-02-10", Some(700), None, Some(5), Some(8.0)),
            activity("a2", "planting", "2026-02-11", Some(500), None, Some(5), Some(8.0)),
            activity("a3", "planting", "2026-02-12", Some(300), None, Some(5), Some(8.0)),
            activity("a4", "planting", "2026-02-13", Some(100), None, Some(5), Some(8.0)),
        ];
        let snapshot = compute_metrics(&down, "2026-02-01", "2026-02-28", 8.0);
        assert!(snapshot.trends.planting_rate_change_percent < 0.0);
        assert_eq!(snapshot.trends.direction, TrendDirection::Down);
    }

    #[test]
    fn test_trend_zero_baseline() {
        let activities = vec![
            activity("a1", "inspection", "2026-02-10", None, None, None, None),
            activity("a2", "planting", "2026-02-11", Some(400), None, Some(5), Some(8.0)),
        ];
        let snapshot = compute_metrics(&activities, "2026-02-01", "2026-02-28", 8.0);
        // First half planted nothing — no baseline, report 0
        assert_eq!(snapshot.trends.planting_rate_change_percent, 0.0);
    }

    #[test]
    fn test_overview_stack_height_from_ratios() {
        let activities = vec![
            activity("a1", "planting", "2026-02-09", Some(400), Some(100), Some(6), Some(8.0)),
            activity("a2", "planting", "2026-02-10", Some(300), Some(60), Some(5), Some(8.0)),
        ];
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let overview = compute_overview(&activities, today, &estimates());
        // mean of 4.0 and 5.0
        assert_eq!(overview.avg_stack_height, 4.5);
        assert_eq!(overview.total_cladodes, 700);
        assert_eq!(overview.total_stations, 160);
        assert_eq!(overview.planting_days, 2);
    }

    #[test]
    fn test_overview_weekly_rate_window() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let activities = vec![
            // Old work far outside the window
            activity("a1", "planting", "2026-01-01", Some(2000), None, Some(6), Some(8.0)),
            // This week
            activity("a2", "planting", "2026-02-08", Some(400), None, Some(6), Some(8.0)),
            activity("a3", "planting", "2026-02-09", Some(600), None, Some(6), Some(8.0)),
        ];
        let overview = compute_overview(&activities, today, &estimates());
        // Only the trailing week counts: (400 + 600) / 2
        assert_eq!(overview.avg_daily_rate, 500.0);
    }

    #[test]
    fn test_overview_rate_falls_back_to_all_time() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let activities = vec![
            activity("a1", "planting", "2026-01-01", Some(900), None, Some(6), Some(8.0)),
            activity("a2", "planting", "2026-01-02", Some(300), None, Some(6), Some(8.0)),
        ];
        let overview = compute_overview(&activities, today, &estimates());
        assert_eq!(overview.avg_daily_rate, 600.0);
    }

    #[test]
    fn test_area_from_stations() {
        // 1200 stations at 600 effective stations/ha → 2 ha
        assert_eq!(estimate_area_planted(1200, 0, 0.0, 600.0), 2.0);
    }

    #[test]
    fn test_area_estimated_from_stack_height() {
        // No station counts: 4800 cladodes at stack height 4 → 1200 stations → 2 ha
        assert_eq!(estimate_area_planted(0, 4800, 4.0, 600.0), 2.0);
    }

    #[test]
    fn test_area_zero_when_unknown() {
        assert_eq!(estimate_area_planted(0, 0, 0.0, 600.0), 0.0);
        assert_eq!(estimate_area_planted(0, 4800, 0.0, 600.0), 0.0);
    }

    #[test]
    fn test_query_metrics_respects_plot_filter() {
        use crate::db::test_utils::test_db;

        let db = test_db();
        let mut a1 = activity("a1", "planting", "2026-02-10", Some(400), None, Some(6), Some(8.0));
        a1.plot_id = "p1".to_string();
        let mut a2 = activity("a2", "planting", "2026-02-10", Some(300), None, Some(4), Some(8.0));
        a2.plot_id = "p2".to_string();
        db.insert_activity(&a1).unwrap();
        db.insert_activity(&a2).unwrap();

        let all = query_metrics(&db, "2026-02-01", "2026-02-28", None, 8.0).unwrap();
        assert_eq!(all.totals.total_planted, 700);

        let p1_only = query_metrics(&db, "2026-02-01", "2026-02-28", Some("p1"), 8.0).unwrap();
        assert_eq!(p1_only.totals.total_planted, 400);
        assert_eq!(p1_only.period_start, "2026-02-01");
    }

    #[test]
    fn test_overview_empty() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let overview = compute_overview(&[], today, &estimates());
        assert_eq!(overview.total_cladodes, 0);
        assert_eq!(overview.avg_daily_rate, 0.0);
        assert_eq!(overview.area_planted_ha, 0.0);
    }
}
