//! Two-tier natural-language extraction engine.
//!
//! Tier one asks the LLM extraction service; tier two is the deterministic
//! rule-based extractor in `fallback`. Extraction is a pure computation over
//! the message text — it touches no shared state and never raises past this
//! module. Failure is represented in the returned data (null fields, low
//! confidence), not as a propagated fault.

pub mod client;
pub mod fallback;
pub mod prompts;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use client::{ExtractionClient, HttpExtractionClient};

use crate::config::EstimateConfig;
use crate::types::ExtractedActivity;

/// Which tier produced the extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Llm,
    Fallback,
    None,
}

/// What one extraction attempt produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub data: Option<ExtractedActivity>,
    /// In [0,1]. The service self-assesses; the fallback uses a fixed
    /// conservative constant.
    pub confidence: f64,
    /// Raw service response text, kept for the audit trail.
    pub raw_response: Option<String>,
    pub source: ExtractionSource,
}

impl ExtractionOutcome {
    fn nothing() -> Self {
        Self {
            data: None,
            confidence: 0.0,
            raw_response: None,
            source: ExtractionSource::None,
        }
    }
}

/// The extraction engine. Holds its client explicitly — no ambient globals;
/// construct one per worker and pass it down.
pub struct ExtractionEngine {
    client: Box<dyn ExtractionClient>,
    fallback_confidence: f64,
}

impl ExtractionEngine {
    pub fn new(client: Box<dyn ExtractionClient>, estimates: &EstimateConfig) -> Self {
        Self {
            client,
            fallback_confidence: estimates.fallback_confidence,
        }
    }

    /// Extract structured data from one field message.
    ///
    /// Never returns an error: a service fault drops to the rule-based
    /// fallback, and an unparseable service reply is recorded as "nothing
    /// extracted" with the raw text preserved.
    pub async fn extract(
        &self,
        body: &str,
        from: Option<&str>,
        today: NaiveDate,
    ) -> ExtractionOutcome {
        if body.trim().is_empty() {
            return ExtractionOutcome::nothing();
        }

        let prompt = prompts::build_extraction_prompt(body, from, today);

        match self.client.complete(&prompt).await {
            Ok(response) => match prompts::parse_extraction_response(&response) {
                Some((data, confidence)) => ExtractionOutcome {
                    data: Some(data),
                    confidence,
                    raw_response: Some(response),
                    source: ExtractionSource::Llm,
                },
                None => {
                    log::warn!("Extraction service reply contained no usable JSON");
                    ExtractionOutcome {
                        data: None,
                        confidence: 0.0,
                        raw_response: Some(response),
                        source: ExtractionSource::Llm,
                    }
                }
            },
            Err(e) => {
                log::warn!("Extraction service unavailable ({}); using fallback rules", e);
                let data = fallback::extract_fallback(body, today);
                ExtractionOutcome {
                    data: Some(data),
                    confidence: self.fallback_confidence,
                    raw_response: None,
                    source: ExtractionSource::Fallback,
                }
            }
        }
    }
}
