//! Metric-triggered alert rules.
//!
//! Each rule is a pure function from overview metrics + targets to an
//! optional alert draft. Rules are independent; the engine handles
//! persistence, dedup, and lifecycle.

use crate::config::TargetConfig;
use crate::metrics::OverviewMetrics;
use crate::types::Severity;

/// Stable rule identifiers — the dedup keys for metric alerts.
pub const RULE_PLANTING_RATE: &str = "metric-planting-rate";
pub const RULE_AREA_PROGRESS: &str = "metric-area-progress";
pub const RULE_STACK_HEIGHT: &str = "metric-stack-height";

/// Inputs every metric rule evaluates against.
pub struct RuleContext<'a> {
    pub overview: &'a OverviewMetrics,
    pub targets: &'a TargetConfig,
}

/// What a firing rule wants the alerts table to show.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub rule_key: &'static str,
    pub alert_type: &'static str,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: Option<String>,
    /// Achievements start acknowledged — nobody needs to action good news.
    pub pre_acknowledged: bool,
}

/// Function signature for a metric rule.
pub type MetricRuleFn = fn(&RuleContext) -> Option<AlertDraft>;

/// Daily planting rate vs target. Fires below 100%;
/// critical under 50%, high under 70%, medium otherwise.
pub fn planting_rate_rule(ctx: &RuleContext) -> Option<AlertDraft> {
    let target = ctx.targets.daily_planting_rate;
    if target <= 0.0 {
        return None;
    }
    let ratio = ctx.overview.avg_daily_rate / target;
    if ratio >= 1.0 {
        return None;
    }

    let severity = if ratio < 0.5 {
        Severity::Critical
    } else if ratio < 0.7 {
        Severity::High
    } else {
        Severity::Medium
    };

    let recommendation = if ratio < 0.5 {
        "Urgent: Add additional workers or extend work hours immediately"
    } else {
        "Consider adding 1-2 workers or optimizing planting process"
    };

    Some(AlertDraft {
        rule_key: RULE_PLANTING_RATE,
        alert_type: "performance",
        severity,
        title: "Planting Rate Below Target".to_string(),
        description: format!(
            "Current rate: {}/day ({}% of {}/day target)",
            ctx.overview.avg_daily_rate as i64,
            (ratio * 100.0).round() as i64,
            target as i64
        ),
        recommendation: Some(recommendation.to_string()),
        pre_acknowledged: false,
    })
}

/// Area planted vs campaign target. Fires below 50% of target;
/// high under 25%, medium otherwise.
pub fn area_progress_rule(ctx: &RuleContext) -> Option<AlertDraft> {
    let target = ctx.targets.area_planted_ha;
    if target <= 0.0 {
        return None;
    }
    let ratio = ctx.overview.area_planted_ha / target;
    if ratio >= 0.5 {
        return None;
    }

    let severity = if ratio < 0.25 {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(AlertDraft {
        rule_key: RULE_AREA_PROGRESS,
        alert_type: "progress",
        severity,
        title: "Area Planted Behind Schedule".to_string(),
        description: format!(
            "{:.2} ha planted ({}% of {} ha target)",
            ctx.overview.area_planted_ha,
            (ratio * 100.0).round() as i64,
            target
        ),
        recommendation: Some("Focus resources on expanding planted area coverage".to_string()),
        pre_acknowledged: false,
    })
}

/// Stack-height achievement: fires once the average cladodes per station
/// reaches target. Low severity, pre-acknowledged.
pub fn stack_height_rule(ctx: &RuleContext) -> Option<AlertDraft> {
    let target = ctx.targets.stack_height;
    if target <= 0.0 || ctx.overview.avg_stack_height < target {
        return None;
    }

    Some(AlertDraft {
        rule_key: RULE_STACK_HEIGHT,
        alert_type: "achievement",
        severity: Severity::Low,
        title: "Stack Height Target Achieved".to_string(),
        description: format!(
            "Average {:.1} cladodes per station (Target: {})",
            ctx.overview.avg_stack_height, target
        ),
        recommendation: Some("Continue current multi-cladode stacking practice".to_string()),
        pre_acknowledged: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::OverviewMetrics;

    fn overview(rate: f64, area: f64, stack: f64) -> OverviewMetrics {
        OverviewMetrics {
            total_cladodes: 0,
            total_stations: 0,
            avg_stack_height: stack,
            avg_daily_rate: rate,
            area_planted_ha: area,
            planting_days: 0,
        }
    }

    fn targets() -> TargetConfig {
        TargetConfig::default()
    }

    #[test]
    fn test_planting_rate_critical_below_half() {
        // 538/1200 ≈ 0.448 → critical
        let o = overview(538.0, 2.0, 0.0);
        let t = targets();
        let draft = planting_rate_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::Critical);
        assert!(draft.description.contains("538/day"));
        assert!(draft.recommendation.unwrap().starts_with("Urgent"));
    }

    #[test]
    fn test_planting_rate_medium_at_075() {
        // 900/1200 = 0.75 — at or above 0.7, still below 1.0 → medium
        let o = overview(900.0, 2.0, 0.0);
        let t = targets();
        let draft = planting_rate_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::Medium);
    }

    #[test]
    fn test_planting_rate_high_between() {
        // 720/1200 = 0.6 → high
        let o = overview(720.0, 2.0, 0.0);
        let t = targets();
        let draft = planting_rate_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::High);
    }

    #[test]
    fn test_planting_rate_quiet_at_target() {
        let o = overview(1200.0, 2.0, 0.0);
        let t = targets();
        assert!(planting_rate_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .is_none());
    }

    #[test]
    fn test_area_progress_thresholds() {
        let t = targets();

        // 0.4/2.0 = 20% → high
        let o = overview(1200.0, 0.4, 0.0);
        let draft = area_progress_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::High);

        // 0.8/2.0 = 40% → medium
        let o = overview(1200.0, 0.8, 0.0);
        let draft = area_progress_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::Medium);

        // 1.0/2.0 = 50% → quiet
        let o = overview(1200.0, 1.0, 0.0);
        assert!(area_progress_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .is_none());
    }

    #[test]
    fn test_stack_height_achievement() {
        let t = targets();

        let o = overview(1200.0, 2.0, 4.2);
        let draft = stack_height_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .unwrap();
        assert_eq!(draft.severity, Severity::Low);
        assert!(draft.pre_acknowledged);
        assert!(draft.description.contains("4.2"));

        let o = overview(1200.0, 2.0, 3.9);
        assert!(stack_height_rule(&RuleContext {
            overview: &o,
            targets: &t,
        })
        .is_none());
    }
}
