//! Materialization: extracted data → committed domain records.
//!
//! Takes one raw message plus its extraction outcome and produces at most
//! one activity, observations for each detected issue, and alerts for the
//! high/critical ones, then links everything back to the raw message.
//!
//! The activity insert is the only concurrency-sensitive step in the whole
//! pipeline; it is keyed by source message id and arbitrated by the UNIQUE
//! constraint, so replays and concurrent duplicate deliveries collapse to
//! one record. Observations and alerts are only fanned out when the insert
//! actually happened.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::alerts::engine::fingerprint;
use crate::db::{DbActivity, DbAlert, DbObservation, DbRawMessage, FarmDb, ALERT_STATUS_ACTIVE};
use crate::error::PipelineError;
use crate::extraction::ExtractionOutcome;
use crate::types::Severity;

/// What materialization produced for one message.
#[derive(Debug, Clone, Default)]
pub struct MaterializeResult {
    pub activity_id: Option<String>,
    pub observation_ids: Vec<String>,
    pub alert_ids: Vec<String>,
    /// True when the activity already existed (replayed message).
    pub duplicate: bool,
    /// False when the plot code didn't resolve (report stored, no activity).
    pub plot_resolved: bool,
}

/// Materialize one extraction outcome.
///
/// Storage faults propagate as retryable `PipelineError::Storage`; everything
/// else — missing data, unknown activity kind, unresolved plot, duplicate
/// delivery — is a quiet, recoverable outcome recorded in the result.
pub fn materialize_extraction(
    db: &FarmDb,
    message: &DbRawMessage,
    outcome: &ExtractionOutcome,
    today: NaiveDate,
) -> Result<MaterializeResult, PipelineError> {
    let extracted_json = serde_json::to_string(outcome).ok();
    let mut result = MaterializeResult::default();

    // Insufficient information: no kind, or the extractor had zero confidence.
    let (data, kind) = match &outcome.data {
        Some(d) => match d.activity_kind {
            Some(k) if outcome.confidence > 0.0 => (d, k),
            _ => {
                db.mark_message_processed(&message.message_id, extracted_json.as_deref())
                    .map_err(PipelineError::Storage)?;
                return Ok(result);
            }
        },
        None => {
            db.mark_message_processed(&message.message_id, extracted_json.as_deref())
                .map_err(PipelineError::Storage)?;
            return Ok(result);
        }
    };

    // Plot resolution. An unknown code is not an error: the report stays on
    // record, orphaned, and the sender is none the wiser.
    let plot = match &data.plot_code {
        Some(code) => db.find_plot_by_code(code).map_err(PipelineError::Storage)?,
        None => None,
    };
    let plot = match plot {
        Some(p) => p,
        None => {
            log::info!(
                "Message {} reported unresolvable plot {:?}; no activity created",
                message.message_id,
                data.plot_code
            );
            db.mark_message_processed(&message.message_id, extracted_json.as_deref())
                .map_err(PipelineError::Storage)?;
            return Ok(result);
        }
    };
    result.plot_resolved = true;

    let activity_date = data
        .activity_date
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string();

    let activity = DbActivity {
        id: format!("act-{}", Uuid::new_v4()),
        plot_id: plot.id.clone(),
        activity_type: kind.label().to_string(),
        activity_date: activity_date.clone(),
        cladodes_planted: data.cladodes_planted,
        stations_planted: data.stations_planted,
        workers_count: data.workers_count,
        hours_worked: data.hours_worked,
        reported_by: message.from_contact.clone(),
        report_method: "whatsapp".to_string(),
        notes: data.notes.clone().or_else(|| message.body.clone()),
        ai_extracted: true,
        ai_confidence: Some(outcome.confidence),
        source_message_id: Some(message.message_id.clone()),
        created_at: FarmDb::now(),
    };

    // Activity + observations + issue alerts commit together: a replay that
    // loses the insert race fans out nothing.
    let fan_out = db
        .with_transaction(|db| {
            let inserted = db.insert_activity(&activity)?;
            let activity_id = match inserted {
                Some(id) => id,
                None => return Ok(None),
            };

            let mut observation_ids = Vec::new();
            let mut alert_ids = Vec::new();

            for issue in &data.issues {
                let observation = DbObservation {
                    id: format!("obs-{}", Uuid::new_v4()),
                    activity_id: Some(activity_id.clone()),
                    plot_id: Some(plot.id.clone()),
                    observation_date: activity_date.clone(),
                    observation_type: issue.issue_type.label().to_string(),
                    severity: issue.severity.label().to_string(),
                    description: Some(issue.description.clone()),
                    action_required: issue.action_required.clone(),
                    ai_detected: true,
                    status: "open".to_string(),
                    resolved_at: None,
                    created_at: FarmDb::now(),
                };
                db.insert_observation(&observation)?;
                observation_ids.push(observation.id);

                // Only high/critical issues page an operator
                if issue.severity >= Severity::High {
                    let now = FarmDb::now();
                    let alert = DbAlert {
                        id: format!("al-{}", Uuid::new_v4()),
                        rule_key: format!(
                            "issue-{}",
                            fingerprint(&[issue.issue_type.label(), &plot.id, &activity_id])
                        ),
                        alert_type: issue.issue_type.label().to_string(),
                        severity: issue.severity.label().to_string(),
                        title: format!("{} Detected", issue.issue_type.label().replace('_', " ")),
                        description: Some(issue.description.clone()),
                        recommendation: issue.action_required.clone(),
                        related_plot_id: Some(plot.id.clone()),
                        related_activity_id: Some(activity_id.clone()),
                        status: ALERT_STATUS_ACTIVE.to_string(),
                        acknowledged_at: None,
                        resolved_at: None,
                        created_at: now.clone(),
                        updated_at: now,
                    };
                    if let Some(alert_id) = db.insert_issue_alert(&alert)? {
                        alert_ids.push(alert_id);
                    }
                }
            }

            Ok(Some((activity_id, observation_ids, alert_ids)))
        })
        .map_err(PipelineError::Storage)?;

    match fan_out {
        Some((activity_id, observation_ids, alert_ids)) => {
            result.activity_id = Some(activity_id);
            result.observation_ids = observation_ids;
            result.alert_ids = alert_ids;
        }
        None => {
            // Replay: link to the activity the first delivery created
            result.duplicate = true;
            result.activity_id = db
                .get_activity_by_source(&message.message_id)
                .map_err(PipelineError::Storage)?
                .map(|a| a.id);
        }
    }

    if let Some(ref activity_id) = result.activity_id {
        db.link_message_activity(&message.message_id, activity_id)
            .map_err(PipelineError::Storage)?;
    }
    db.mark_message_processed(&message.message_id, extracted_json.as_deref())
        .map_err(PipelineError::Storage)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::{DbPlot, MSG_STATE_PROCESSED};
    use crate::extraction::{ExtractionOutcome, ExtractionSource};
    use crate::types::{ActivityKind, ExtractedActivity, ExtractedIssue, IssueType};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    fn seeded_db() -> FarmDb {
        let db = test_db();
        db.conn_ref()
            .execute_batch("PRAGMA foreign_keys = ON;")
            .unwrap();
        db.upsert_plot(&DbPlot {
            id: "p1".to_string(),
            plot_code: "2A".to_string(),
            plot_name: Some("Plot 2A".to_string()),
            area_ha: Some(0.5),
            planned_density: Some(12000.0),
            status: "in_progress".to_string(),
            created_at: FarmDb::now(),
        })
        .unwrap();
        db
    }

    fn message(message_id: &str) -> DbRawMessage {
        DbRawMessage {
            id: format!("rm-{}", message_id),
            message_id: message_id.to_string(),
            from_contact: Some("+27820000001".to_string()),
            body: Some("Planted 400 cladodes in Plot 2A today".to_string()),
            message_type: "text".to_string(),
            media_url: None,
            media_content_type: None,
            state: "received".to_string(),
            received_at: FarmDb::now(),
            processed_at: None,
            extracted_json: None,
            linked_activity_id: None,
        }
    }

    fn outcome_with(data: ExtractedActivity, confidence: f64) -> ExtractionOutcome {
        ExtractionOutcome {
            data: Some(data),
            confidence,
            raw_response: None,
            source: ExtractionSource::Llm,
        }
    }

    fn planting_extraction() -> ExtractedActivity {
        ExtractedActivity {
            activity_kind: Some(ActivityKind::Planting),
            plot_code: Some("2A".to_string()),
            cladodes_planted: Some(400),
            workers_count: Some(6),
            ..Default::default()
        }
    }

    #[test]
    fn test_happy_path_creates_activity() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let result =
            materialize_extraction(&db, &msg, &outcome_with(planting_extraction(), 0.9), today())
                .unwrap();

        assert!(result.plot_resolved);
        assert!(!result.duplicate);
        let activity_id = result.activity_id.unwrap();

        let activity = db.get_activity_by_source("SM001").unwrap().unwrap();
        assert_eq!(activity.id, activity_id);
        assert_eq!(activity.activity_type, "planting");
        assert_eq!(activity.cladodes_planted, Some(400));
        // No explicit date in the extraction → defaults to today
        assert_eq!(activity.activity_date, "2026-02-10");
        assert!(activity.ai_extracted);

        let stored = db.get_raw_message("SM001").unwrap().unwrap();
        assert_eq!(stored.state, MSG_STATE_PROCESSED);
        assert_eq!(stored.linked_activity_id.as_deref(), Some(activity_id.as_str()));
        assert!(stored.extracted_json.is_some());
    }

    #[test]
    fn test_issues_fan_out_to_observations_and_alerts() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.issues = vec![
            ExtractedIssue {
                issue_type: IssueType::Pest,
                severity: Severity::High,
                description: "Aphids on rows 3-5".to_string(),
                action_required: Some("Spray affected rows".to_string()),
            },
            ExtractedIssue {
                issue_type: IssueType::SpacingError,
                severity: Severity::Medium,
                description: "Rows too close".to_string(),
                action_required: None,
            },
        ];

        let result =
            materialize_extraction(&db, &msg, &outcome_with(data, 0.9), today()).unwrap();

        // One observation per issue, but only the high one alerts
        assert_eq!(result.observation_ids.len(), 2);
        assert_eq!(result.alert_ids.len(), 1);

        let alert = db.get_alert(&result.alert_ids[0]).unwrap().unwrap();
        assert_eq!(alert.alert_type, "pest");
        assert_eq!(alert.severity, "high");
        assert_eq!(alert.title, "pest Detected");
        assert_eq!(alert.related_plot_id.as_deref(), Some("p1"));
        assert_eq!(
            alert.related_activity_id.as_deref(),
            result.activity_id.as_deref()
        );
    }

    #[test]
    fn test_medium_issue_does_not_alert() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.issues = vec![ExtractedIssue {
            issue_type: IssueType::SpacingError,
            severity: Severity::Medium,
            description: "spacing too close".to_string(),
            action_required: None,
        }];

        let result =
            materialize_extraction(&db, &msg, &outcome_with(data, 0.9), today()).unwrap();
        assert_eq!(result.observation_ids.len(), 1);
        assert!(result.alert_ids.is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.issues = vec![ExtractedIssue {
            issue_type: IssueType::Pest,
            severity: Severity::Critical,
            description: "swarm".to_string(),
            action_required: None,
        }];
        let outcome = outcome_with(data, 0.9);

        let first = materialize_extraction(&db, &msg, &outcome, today()).unwrap();
        let second = materialize_extraction(&db, &msg, &outcome, today()).unwrap();

        assert!(second.duplicate);
        assert_eq!(second.activity_id, first.activity_id);
        assert!(second.observation_ids.is_empty());
        assert!(second.alert_ids.is_empty());

        // Still exactly one of everything
        let activities: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))
            .unwrap();
        let observations: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM field_observations", [], |row| row.get(0))
            .unwrap();
        let alerts: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .unwrap();
        assert_eq!((activities, observations, alerts), (1, 1, 1));
    }

    #[test]
    fn test_missing_kind_creates_nothing() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.activity_kind = None;

        let result =
            materialize_extraction(&db, &msg, &outcome_with(data, 0.9), today()).unwrap();
        assert!(result.activity_id.is_none());

        // Message is still processed — this is not a failure
        let stored = db.get_raw_message("SM001").unwrap().unwrap();
        assert_eq!(stored.state, MSG_STATE_PROCESSED);
    }

    #[test]
    fn test_zero_confidence_creates_nothing() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let result =
            materialize_extraction(&db, &msg, &outcome_with(planting_extraction(), 0.0), today())
                .unwrap();
        assert!(result.activity_id.is_none());
    }

    #[test]
    fn test_unknown_plot_is_silent_and_recoverable() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.plot_code = Some("9Z".to_string());

        let result =
            materialize_extraction(&db, &msg, &outcome_with(data, 0.9), today()).unwrap();
        assert!(!result.plot_resolved);
        assert!(result.activity_id.is_none());

        let stored = db.get_raw_message("SM001").unwrap().unwrap();
        assert_eq!(stored.state, MSG_STATE_PROCESSED);
        assert!(stored.linked_activity_id.is_none());
    }

    #[test]
    fn test_explicit_date_wins_over_today() {
        let db = seeded_db();
        let msg = message("SM001");
        db.insert_raw_message(&msg).unwrap();

        let mut data = planting_extraction();
        data.activity_date = NaiveDate::from_ymd_opt(2026, 2, 8);

        materialize_extraction(&db, &msg, &outcome_with(data, 0.9), today()).unwrap();
        let activity = db.get_activity_by_source("SM001").unwrap().unwrap();
        assert_eq!(activity.activity_date, "2026-02-08");
    }
}
