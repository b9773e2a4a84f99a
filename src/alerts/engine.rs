//! Metric alert evaluation engine.
//!
//! Manages a registry of metric rules, runs them against the current farm
//! overview, and reconciles the alerts table: firing rules upsert (insert or
//! refresh-in-place, keyed by rule id), quiet rules auto-resolve their active
//! alert. Acknowledged and resolved alerts are never touched by evaluation —
//! the lifecycle only moves forward.
//!
//! Evaluation is idempotent and safe to run concurrently with message
//! materialization: the two write paths target disjoint rule keys.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::rules::{self, AlertDraft, MetricRuleFn, RuleContext};
use crate::config::FarmConfig;
use crate::db::{AlertUpsertOutcome, DbAlert, FarmDb, ALERT_STATUS_ACKNOWLEDGED, ALERT_STATUS_ACTIVE};
use crate::metrics;

/// A registered metric rule.
pub struct RuleEntry {
    pub name: &'static str,
    pub rule_key: &'static str,
    pub rule: MetricRuleFn,
}

/// What one evaluation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalSummary {
    pub created: usize,
    pub refreshed: usize,
    pub auto_resolved: usize,
    pub untouched: usize,
}

/// The metric alert engine.
#[derive(Default)]
pub struct AlertEngine {
    rules: Vec<RuleEntry>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule with its stable key.
    pub fn register(&mut self, name: &'static str, rule_key: &'static str, rule: MetricRuleFn) {
        self.rules.push(RuleEntry {
            name,
            rule_key,
            rule,
        });
    }

    /// Run every rule and reconcile the alerts table.
    pub fn evaluate(&self, db: &FarmDb, ctx: &RuleContext) -> Result<EvalSummary, String> {
        let mut summary = EvalSummary::default();

        for entry in &self.rules {
            match (entry.rule)(ctx) {
                Some(draft) => match db.upsert_metric_alert(&draft_to_row(&draft))? {
                    AlertUpsertOutcome::Created => {
                        log::info!("Alert raised: {} ({})", draft.title, entry.name);
                        summary.created += 1;
                    }
                    AlertUpsertOutcome::Refreshed => summary.refreshed += 1,
                    AlertUpsertOutcome::Untouched => summary.untouched += 1,
                },
                None => {
                    if db.resolve_metric_alert_if_active(entry.rule_key)? {
                        log::info!("Alert auto-resolved: {}", entry.name);
                        summary.auto_resolved += 1;
                    }
                }
            }
        }

        Ok(summary)
    }
}

/// Build the default engine with all three metric rules registered.
pub fn default_engine() -> AlertEngine {
    let mut engine = AlertEngine::new();
    engine.register(
        "planting_rate",
        rules::RULE_PLANTING_RATE,
        rules::planting_rate_rule,
    );
    engine.register(
        "area_progress",
        rules::RULE_AREA_PROGRESS,
        rules::area_progress_rule,
    );
    engine.register(
        "stack_height",
        rules::RULE_STACK_HEIGHT,
        rules::stack_height_rule,
    );
    engine
}

/// Recompute the farm overview from all activity rows and reconcile the
/// metric alerts. This is the scheduled/on-demand evaluation path.
pub fn evaluate_metric_alerts(
    db: &FarmDb,
    config: &FarmConfig,
    today: NaiveDate,
) -> Result<EvalSummary, String> {
    let activities = db.get_all_activities()?;
    let overview = metrics::compute_overview(&activities, today, &config.estimates);

    let ctx = RuleContext {
        overview: &overview,
        targets: &config.targets,
    };
    default_engine().evaluate(db, &ctx)
}

fn draft_to_row(draft: &AlertDraft) -> DbAlert {
    let now = FarmDb::now();
    let status = if draft.pre_acknowledged {
        ALERT_STATUS_ACKNOWLEDGED
    } else {
        ALERT_STATUS_ACTIVE
    };
    DbAlert {
        id: format!("al-{}", Uuid::new_v4()),
        rule_key: draft.rule_key.to_string(),
        alert_type: draft.alert_type.to_string(),
        severity: draft.severity.label().to_string(),
        title: draft.title.clone(),
        description: Some(draft.description.clone()),
        recommendation: draft.recommendation.clone(),
        related_plot_id: None,
        related_activity_id: None,
        status: status.to_string(),
        acknowledged_at: None,
        resolved_at: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Compute a dedup fingerprint from key components.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
