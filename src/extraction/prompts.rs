//! Prompt construction and response parsing for the extraction service.
//!
//! The service is asked to return exactly one JSON object. Models pad their
//! answers anyway — markdown fences, commentary — so parsing scans for the
//! first balanced `{...}` span instead of trusting the whole body, then
//! deserializes leniently: unknown enum values and out-of-range numbers are
//! dropped, never fatal.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::types::{
    clamp_confidence, ActivityKind, ExtractedActivity, ExtractedIssue, IssueType, ResourceRequest,
    Sentiment, Severity,
};

// =============================================================================
// Prompt Construction
// =============================================================================

/// Build the extraction prompt for one field message.
pub fn build_extraction_prompt(message: &str, from: Option<&str>, today: NaiveDate) -> String {
    let mut prompt = String::with_capacity(2_000);

    prompt.push_str("You are an AI assistant for a farm operations system. ");
    prompt.push_str("You help extract structured data from field messages sent by farm workers.\n\n");

    prompt.push_str("The farm grows Opuntia (prickly pear cactus) and workers report activities like:\n");
    prompt.push_str("- Planting cladodes (cactus paddles)\n");
    prompt.push_str("- Site clearing/preparation\n");
    prompt.push_str("- Inspections and quality checks\n");
    prompt.push_str("- Weeding and maintenance\n");
    prompt.push_str("- Watering and fertilizing\n\n");

    prompt.push_str("Extract structured data from this field message:\n\n");
    prompt.push_str(&format!("MESSAGE: \"{}\"\n", message));
    if let Some(sender) = from {
        prompt.push_str(&format!("FROM: {}\n", sender));
    }
    prompt.push_str(&format!("DATE: {}\n\n", today.format("%Y-%m-%d")));

    prompt.push_str("Extract the following information if present:\n");
    prompt.push_str("1. Activity type (planting, site_clearing, inspection, weeding, watering, fertilizing, harvesting, other)\n");
    prompt.push_str("2. Quantities (number of cladodes, stations planted)\n");
    prompt.push_str("3. Location (plot code like \"2A\", \"3B\")\n");
    prompt.push_str("4. Labor (worker count, hours worked)\n");
    prompt.push_str("5. Issues detected (problems, concerns, quality issues)\n");
    prompt.push_str("6. Resource needs (water, equipment, supplies)\n");
    prompt.push_str("7. Date (infer from the DATE line if not explicit)\n");
    prompt.push_str("8. Weather conditions mentioned\n");
    prompt.push_str("9. Sentiment (positive, neutral, concerned, urgent)\n\n");

    prompt.push_str("Return ONLY valid JSON with this structure (no explanation, no markdown fences):\n");
    prompt.push_str(
        r#"{
  "activity_type": "planting|site_clearing|inspection|weeding|watering|fertilizing|harvesting|other",
  "plot_id": "2A",
  "cladodes_planted": 400,
  "stations_planted": 100,
  "workers": 6,
  "hours_worked": 8,
  "date": "2026-01-26",
  "issues": [
    {
      "type": "spacing_error|pest|disease|weed|water|quality|other",
      "severity": "low|medium|high|critical",
      "description": "Rows too close together",
      "action_required": "Adjust spacing"
    }
  ],
  "resources_needed": [
    {
      "item": "water",
      "urgency": "low|medium|high",
      "quantity": null
    }
  ],
  "weather_conditions": "hot",
  "sentiment": "concerned",
  "notes": "Additional observations",
  "confidence": 0.92
}"#,
    );

    prompt.push_str("\n\nOnly include fields that are clearly mentioned or can be confidently inferred.\n");
    prompt.push_str("Set confidence between 0 and 1 based on how clear the message is.\n");

    prompt
}

// =============================================================================
// Response Parsing
// =============================================================================

/// Find the first complete JSON object `{...}` in the text.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escape {
            escape = false;
            continue;
        }
        if b == b'\\' && in_string {
            escape = true;
            continue;
        }
        if b == b'"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Loose mirror of the JSON the service is asked for. Every field is optional
/// and strings are taken as-is; normalization happens afterwards.
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    activity_type: Option<String>,
    #[serde(default)]
    plot_id: Option<String>,
    #[serde(default)]
    cladodes_planted: Option<f64>,
    #[serde(default)]
    stations_planted: Option<f64>,
    #[serde(default)]
    workers: Option<f64>,
    #[serde(default)]
    hours_worked: Option<f64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    resources_needed: Vec<RawResource>,
    #[serde(default)]
    weather_conditions: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIssue {
    #[serde(default, rename = "type")]
    issue_type: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    action_required: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResource {
    #[serde(default)]
    item: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    quantity: Option<f64>,
}

/// Parse the service's response text into extraction data plus confidence.
///
/// Returns `None` when no JSON object can be recovered or it fails to parse —
/// the caller records "nothing extracted", not an error. Absent confidence
/// defaults to 0.5 (the service forgot to self-assess, the data may still be
/// fine); out-of-range values are clamped.
pub fn parse_extraction_response(response: &str) -> Option<(ExtractedActivity, f64)> {
    let json_str = extract_json_object(response)?;
    let raw: RawPayload = match serde_json::from_str(&json_str) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Extraction response JSON did not parse: {}", e);
            return None;
        }
    };

    let confidence = clamp_confidence(raw.confidence.unwrap_or(0.5));

    let issues = raw
        .issues
        .into_iter()
        .filter_map(|i| {
            let description = i.description?;
            Some(ExtractedIssue {
                issue_type: IssueType::parse_or_other(i.issue_type.as_deref().unwrap_or("")),
                severity: Severity::parse_or_medium(i.severity.as_deref().unwrap_or("")),
                description,
                action_required: i.action_required,
            })
        })
        .collect();

    let resources_needed = raw
        .resources_needed
        .into_iter()
        .filter_map(|r| {
            Some(ResourceRequest {
                item: r.item?,
                urgency: r.urgency,
                quantity: r.quantity,
            })
        })
        .collect();

    let data = ExtractedActivity {
        activity_kind: raw.activity_type.as_deref().and_then(ActivityKind::parse),
        plot_code: raw.plot_id.as_deref().map(normalize_plot_code),
        cladodes_planted: raw.cladodes_planted.map(|n| n as i64),
        stations_planted: raw.stations_planted.map(|n| n as i64),
        workers_count: raw.workers.map(|n| n as i64),
        hours_worked: raw.hours_worked,
        activity_date: raw
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        issues,
        resources_needed,
        weather_conditions: raw.weather_conditions,
        sentiment: raw.sentiment.as_deref().and_then(Sentiment::parse),
        notes: raw.notes,
    };

    Some((data, confidence))
}

/// Normalize a plot code the way the fallback extractor does: strip hyphens,
/// uppercase, drop surrounding whitespace.
fn normalize_plot_code(code: &str) -> String {
    code.trim().replace('-', "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_simple() {
        let text = r#"Here is the result: {"foo": "bar"} and more text"#;
        let result = extract_json_object(text);
        assert_eq!(result, Some(r#"{"foo": "bar"}"#.to_string()));
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"{"a": {"b": 1}, "c": 2}"#;
        let result = extract_json_object(text);
        assert_eq!(result, Some(r#"{"a": {"b": 1}, "c": 2}"#.to_string()));
    }

    #[test]
    fn test_extract_json_object_with_escaped_quotes() {
        let text = r#"{"text": "value with \"quotes\" inside"}"#;
        let result = extract_json_object(text);
        assert!(result.is_some());
    }

    #[test]
    fn test_extract_json_object_no_json() {
        let text = "No JSON here at all";
        assert_eq!(extract_json_object(text), None);
    }

    #[test]
    fn test_extract_json_object_with_markdown_fences() {
        let text = "```json\n{\"key\": \"value\"}\n```";
        let result = extract_json_object(text);
        assert_eq!(result, Some(r#"{"key": "value"}"#.to_string()));
    }

    #[test]
    fn test_parse_full_response() {
        let response = r#"Sure! Here's the extraction:
{
  "activity_type": "planting",
  "plot_id": "2a",
  "cladodes_planted": 400,
  "workers": 6,
  "hours_worked": 7.5,
  "date": "2026-02-10",
  "issues": [
    {"type": "pest", "severity": "high", "description": "Aphids on rows 3-5", "action_required": "Spray"}
  ],
  "sentiment": "concerned",
  "confidence": 0.92
}"#;
        let (data, confidence) = parse_extraction_response(response).unwrap();
        assert_eq!(data.activity_kind, Some(ActivityKind::Planting));
        assert_eq!(data.plot_code.as_deref(), Some("2A"));
        assert_eq!(data.cladodes_planted, Some(400));
        assert_eq!(data.workers_count, Some(6));
        assert_eq!(data.hours_worked, Some(7.5));
        assert_eq!(
            data.activity_date,
            NaiveDate::from_ymd_opt(2026, 2, 10)
        );
        assert_eq!(data.issues.len(), 1);
        assert_eq!(data.issues[0].issue_type, IssueType::Pest);
        assert_eq!(data.sentiment, Some(Sentiment::Concerned));
        assert_eq!(confidence, 0.92);
    }

    #[test]
    fn test_parse_defaults_missing_confidence() {
        let response = r#"{"activity_type": "weeding", "plot_id": "3B"}"#;
        let (data, confidence) = parse_extraction_response(response).unwrap();
        assert_eq!(data.activity_kind, Some(ActivityKind::Weeding));
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn test_parse_clamps_out_of_range_confidence() {
        let response = r#"{"activity_type": "planting", "confidence": 1.8}"#;
        let (_, confidence) = parse_extraction_response(response).unwrap();
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_parse_drops_unknown_enum_values() {
        let response = r#"{
  "activity_type": "transplanting",
  "sentiment": "ecstatic",
  "issues": [{"type": "locusts", "severity": "apocalyptic", "description": "swarm"}],
  "confidence": 0.8
}"#;
        let (data, _) = parse_extraction_response(response).unwrap();
        // Unknown kind treated as absent, not an error
        assert_eq!(data.activity_kind, None);
        assert_eq!(data.sentiment, None);
        // Unknown issue fields degrade instead of dropping the issue
        assert_eq!(data.issues[0].issue_type, IssueType::Other);
        assert_eq!(data.issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_parse_bad_date_treated_as_absent() {
        let response = r#"{"activity_type": "planting", "date": "26/01/2026"}"#;
        let (data, _) = parse_extraction_response(response).unwrap();
        assert_eq!(data.activity_date, None);
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_extraction_response("I could not process this").is_none());
        assert!(parse_extraction_response("{not actually json}").is_none());
    }

    #[test]
    fn test_prompt_contains_message_and_schema() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let prompt =
            build_extraction_prompt("Planted 400 in Plot 2A", Some("+27820000001"), today);
        assert!(prompt.contains("MESSAGE: \"Planted 400 in Plot 2A\""));
        assert!(prompt.contains("FROM: +27820000001"));
        assert!(prompt.contains("DATE: 2026-02-10"));
        assert!(prompt.contains("\"confidence\": 0.92"));
        assert!(prompt.contains("Return ONLY valid JSON"));
    }
}
