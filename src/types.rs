//! Domain enums and extraction data types shared across the pipeline.
//!
//! The extraction payload mirrors what the extraction service is asked to
//! return (see `extraction::prompts`): activity kind, plot code, quantities,
//! issues, resource requests, weather, sentiment, notes. Parsing is lenient —
//! unknown enum values degrade to `None`/`Other` rather than failing the
//! whole payload.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Kind of field operation reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Planting,
    SiteClearing,
    Inspection,
    Weeding,
    Watering,
    Fertilizing,
    Harvesting,
    Other,
}

impl ActivityKind {
    /// Database label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Planting => "planting",
            Self::SiteClearing => "site_clearing",
            Self::Inspection => "inspection",
            Self::Weeding => "weeding",
            Self::Watering => "watering",
            Self::Fertilizing => "fertilizing",
            Self::Harvesting => "harvesting",
            Self::Other => "other",
        }
    }

    /// Parse a label leniently. The extraction service sometimes says
    /// "clearing" where the schema says "site_clearing"; unknown kinds
    /// are treated as absent, not as an error.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "planting" => Some(Self::Planting),
            "site_clearing" | "clearing" => Some(Self::SiteClearing),
            "inspection" => Some(Self::Inspection),
            "weeding" => Some(Self::Weeding),
            "watering" => Some(Self::Watering),
            "fertilizing" => Some(Self::Fertilizing),
            "harvesting" => Some(Self::Harvesting),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Severity scale shared by observations and alerts. Ordered so that
/// `severity >= Severity::High` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Lenient parse; unknown severities default to `Medium`.
    pub fn parse_or_medium(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// Issue categories the extraction layer knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    SpacingError,
    Pest,
    Disease,
    Weed,
    Water,
    Quality,
    Other,
}

impl IssueType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SpacingError => "spacing_error",
            Self::Pest => "pest",
            Self::Disease => "disease",
            Self::Weed => "weed",
            Self::Water => "water",
            Self::Quality => "quality",
            Self::Other => "other",
        }
    }

    /// Lenient parse; unknown issue types degrade to `Other`.
    pub fn parse_or_other(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "spacing_error" | "spacing" => Self::SpacingError,
            "pest" => Self::Pest,
            "disease" => Self::Disease,
            "weed" => Self::Weed,
            "water" => Self::Water,
            "quality" => Self::Quality,
            _ => Self::Other,
        }
    }
}

/// Overall tone of a field message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Concerned,
    Urgent,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Concerned => "concerned",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "concerned" => Some(Self::Concerned),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction payload
// ---------------------------------------------------------------------------

/// A single issue surfaced by extraction, in message order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub action_required: Option<String>,
}

/// A resource request surfaced by extraction ("need more water/stakes/...").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub item: String,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
}

/// Structured result of extracting one field message. Embedded on the raw
/// message as JSON and consumed by the materialization service; not persisted
/// on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedActivity {
    #[serde(default)]
    pub activity_kind: Option<ActivityKind>,
    /// Normalized plot code ("2A"), not yet resolved to a plot row.
    #[serde(default)]
    pub plot_code: Option<String>,
    #[serde(default)]
    pub cladodes_planted: Option<i64>,
    #[serde(default)]
    pub stations_planted: Option<i64>,
    #[serde(default)]
    pub workers_count: Option<i64>,
    #[serde(default)]
    pub hours_worked: Option<f64>,
    #[serde(default)]
    pub activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub issues: Vec<ExtractedIssue>,
    #[serde(default)]
    pub resources_needed: Vec<ResourceRequest>,
    #[serde(default)]
    pub weather_conditions: Option<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExtractedActivity {
    /// True when extraction found nothing usable at all.
    pub fn is_empty(&self) -> bool {
        self.activity_kind.is_none()
            && self.plot_code.is_none()
            && self.cladodes_planted.is_none()
            && self.workers_count.is_none()
            && self.issues.is_empty()
    }
}

/// Clamp a confidence value into [0,1]. Out-of-range or non-finite values
/// from the extraction service are treated as absent (0.0).
pub fn clamp_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
