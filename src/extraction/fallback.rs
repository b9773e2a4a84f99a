//! Deterministic rule-based extraction over raw message text.
//!
//! Runs when the extraction service is unavailable, times out, or errors.
//! Every extractor is an ordered rule table evaluated in declared order —
//! first match wins. Ordering is part of the contract (and of the tests),
//! not an accident of control flow.
//!
//! Known ambiguity: a message containing both a bare day number and a month
//! abbreviation can be read as "D Mon" or "Mon D"; the "D Mon" pattern is
//! checked first and wins.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::types::{
    ActivityKind, ExtractedActivity, ExtractedIssue, IssueType, Sentiment, Severity,
};

// ---------------------------------------------------------------------------
// Keyword tables (ordered; first match wins)
// ---------------------------------------------------------------------------

/// Activity kinds by keyword membership. Substring match on the lowercased
/// message, so "plant" also covers "planted"/"planting".
const ACTIVITY_KEYWORDS: &[(ActivityKind, &[&str])] = &[
    (ActivityKind::Planting, &["plant", "sow"]),
    (ActivityKind::SiteClearing, &["clear", "prepare"]),
    (ActivityKind::Inspection, &["inspect", "check", "review"]),
    (ActivityKind::Weeding, &["weed"]),
    (ActivityKind::Watering, &["water", "irrigat"]),
    (
        ActivityKind::Fertilizing,
        &["fertili", "compost", "manure", "feed"],
    ),
];

/// Issue types with their default severities. At most one issue per type
/// per message; the first matching keyword names the trigger.
const ISSUE_KEYWORDS: &[(IssueType, Severity, &[&str])] = &[
    (
        IssueType::SpacingError,
        Severity::Medium,
        &["spacing", "too close", "too far", "alignment"],
    ),
    (
        IssueType::Pest,
        Severity::High,
        &["pest", "insect", "bug", "caterpillar", "aphid"],
    ),
    (
        IssueType::Disease,
        Severity::High,
        &["disease", "rot", "fungus", "mold", "sick", "dying"],
    ),
    (IssueType::Weed, Severity::Medium, &["weed", "overgrown", "grass"]),
    (
        IssueType::Water,
        Severity::High,
        &["dry", "need water", "drought", "wilting"],
    ),
    (
        IssueType::Quality,
        Severity::Medium,
        &["quality", "poor", "damaged", "broken"],
    ),
];

/// Sentiment categories in precedence order: urgent > concerned > positive.
/// No match means neutral.
const SENTIMENT_KEYWORDS: &[(Sentiment, &[&str])] = &[
    (
        Sentiment::Urgent,
        &["urgent", "asap", "immediately", "emergency", "critical"],
    ),
    (
        Sentiment::Concerned,
        &["problem", "issue", "concern", "worry", "bad", "trouble"],
    ),
    (
        Sentiment::Positive,
        &["good", "great", "excellent", "completed", "done", "success"],
    ),
];

// ---------------------------------------------------------------------------
// Pattern tables (compile-once via OnceLock, evaluated in order)
// ---------------------------------------------------------------------------

fn plot_code_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            Regex::new(r"(?i)plot\s*(\d+[A-Za-z]?)").unwrap(),
            Regex::new(r"\b(\d+[A-Za-z])\b").unwrap(),
            Regex::new(r"\b(\d+-[A-Za-z])\b").unwrap(),
        ]
    })
}

fn cladode_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            Regex::new(r"(?i)(\d[\d,]*)\s*cladodes?").unwrap(),
            Regex::new(r"(?i)planted\s*(\d[\d,]*)").unwrap(),
            Regex::new(r"(?i)(\d[\d,]*)\s*plants?").unwrap(),
            Regex::new(r"(?i)(\d[\d,]*)\s*paddles?").unwrap(),
        ]
    })
}

fn worker_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            Regex::new(r"(?i)(\d+)\s*workers?").unwrap(),
            Regex::new(r"(?i)(\d+)\s*people").unwrap(),
            Regex::new(r"(?i)(\d+)\s*staff").unwrap(),
            Regex::new(r"(?i)team\s*of\s*(\d+)").unwrap(),
            Regex::new(r"(?i)(\d+)\s*laborers?").unwrap(),
        ]
    })
}

fn re_iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap())
}

fn re_day_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)").unwrap()
    })
}

fn re_month_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+(\d{1,2})\b").unwrap()
    })
}

// ---------------------------------------------------------------------------
// Field extractors
// ---------------------------------------------------------------------------

/// Extract a plot code like "2A" from "Plot 2A", bare "2A", or "3-B".
/// Normalizes by removing hyphens and uppercasing.
pub fn extract_plot_code(text: &str) -> Option<String> {
    for pattern in plot_code_patterns() {
        if let Some(caps) = pattern.captures(text) {
            return Some(caps[1].replace('-', "").to_uppercase());
        }
    }
    None
}

/// Extract a cladode count from "400 cladodes", "planted 400", etc.
/// Thousands separators are stripped.
pub fn extract_cladode_count(text: &str) -> Option<i64> {
    for pattern in cladode_patterns() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(n) = caps[1].replace(',', "").parse::<i64>() {
                return Some(n);
            }
        }
    }
    None
}

/// Extract a worker count from "6 workers", "team of 6", etc.
pub fn extract_worker_count(text: &str) -> Option<i64> {
    for pattern in worker_patterns() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(n) = caps[1].parse::<i64>() {
                return Some(n);
            }
        }
    }
    None
}

/// Extract an activity date relative to `today`.
///
/// "today"/"yesterday" first, then ISO `YYYY-MM-DD`, then `D Mon` / `Mon D`
/// resolved against the current year. Calendar-invalid matches fall through
/// to the next pattern.
pub fn extract_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();

    if lower.contains("today") {
        return Some(today);
    }
    if lower.contains("yesterday") {
        return today.pred_opt();
    }

    if let Some(caps) = re_iso_date().captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = re_day_month().captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2]);
        if let Some(date) = NaiveDate::from_ymd_opt(today.year(), month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = re_month_day().captures(text) {
        let month = month_number(&caps[1]);
        let day: u32 = caps[2].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(today.year(), month, day) {
            return Some(date);
        }
    }

    None
}

fn month_number(abbrev: &str) -> u32 {
    match abbrev.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        _ => 12,
    }
}

/// Detect the activity kind by keyword membership, table order wins.
pub fn detect_activity_kind(text: &str) -> Option<ActivityKind> {
    let lower = text.to_lowercase();
    for (kind, keywords) in ACTIVITY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(*kind);
        }
    }
    None
}

/// Detect issues by keyword membership; at most one issue per type.
pub fn detect_issues(text: &str) -> Vec<ExtractedIssue> {
    let lower = text.to_lowercase();
    let mut issues = Vec::new();

    for (issue_type, severity, keywords) in ISSUE_KEYWORDS {
        if let Some(keyword) = keywords.iter().find(|k| lower.contains(*k)) {
            issues.push(ExtractedIssue {
                issue_type: *issue_type,
                severity: *severity,
                description: format!("Detected keyword: {}", keyword),
                action_required: None,
            });
        }
    }

    issues
}

/// Classify sentiment: urgent > concerned > positive > neutral.
pub fn analyze_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    for (sentiment, keywords) in SENTIMENT_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *sentiment;
        }
    }
    Sentiment::Neutral
}

/// Run every fallback extractor over the message text.
pub fn extract_fallback(text: &str, today: NaiveDate) -> ExtractedActivity {
    ExtractedActivity {
        activity_kind: detect_activity_kind(text),
        plot_code: extract_plot_code(text),
        cladodes_planted: extract_cladode_count(text),
        stations_planted: None,
        workers_count: extract_worker_count(text),
        hours_worked: None,
        activity_date: extract_date(text, today),
        issues: detect_issues(text),
        resources_needed: Vec::new(),
        weather_conditions: None,
        sentiment: Some(analyze_sentiment(text)),
        notes: None,
    }
}
