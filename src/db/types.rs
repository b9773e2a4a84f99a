//! Row structs for the pipeline tables.
//!
//! These mirror the SQLite schema one-to-one. Higher layers convert to and
//! from the domain types in `crate::types`.

use serde::{Deserialize, Serialize};

/// Processing state of a raw gateway message.
pub const MSG_STATE_RECEIVED: &str = "received";
pub const MSG_STATE_PROCESSED: &str = "processed";
pub const MSG_STATE_FAILED: &str = "failed";

/// An inbound field report exactly as the gateway delivered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRawMessage {
    pub id: String,
    pub message_id: String,
    pub from_contact: Option<String>,
    pub body: Option<String>,
    pub message_type: String,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
    pub state: String,
    pub received_at: String,
    pub processed_at: Option<String>,
    pub extracted_json: Option<String>,
    pub linked_activity_id: Option<String>,
}

/// A bounded field area identified by a short code like "2A".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbPlot {
    pub id: String,
    pub plot_code: String,
    pub plot_name: Option<String>,
    pub area_ha: Option<f64>,
    pub planned_density: Option<f64>,
    pub status: String,
    pub created_at: String,
}

/// A committed field operation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbActivity {
    pub id: String,
    pub plot_id: String,
    pub activity_type: String,
    pub activity_date: String,
    pub cladodes_planted: Option<i64>,
    pub stations_planted: Option<i64>,
    pub workers_count: Option<i64>,
    pub hours_worked: Option<f64>,
    pub reported_by: Option<String>,
    pub report_method: String,
    pub notes: Option<String>,
    pub ai_extracted: bool,
    pub ai_confidence: Option<f64>,
    pub source_message_id: Option<String>,
    pub created_at: String,
}

/// A detected issue tied to an activity and plot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbObservation {
    pub id: String,
    pub activity_id: Option<String>,
    pub plot_id: Option<String>,
    pub observation_date: String,
    pub observation_type: String,
    pub severity: String,
    pub description: Option<String>,
    pub action_required: Option<String>,
    pub ai_detected: bool,
    pub status: String,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

/// An operator-facing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbAlert {
    pub id: String,
    pub rule_key: String,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub related_plot_id: Option<String>,
    pub related_activity_id: Option<String>,
    pub status: String,
    pub acknowledged_at: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Alert lifecycle states; transitions are forward-only.
pub const ALERT_STATUS_ACTIVE: &str = "active";
pub const ALERT_STATUS_ACKNOWLEDGED: &str = "acknowledged";
pub const ALERT_STATUS_RESOLVED: &str = "resolved";
