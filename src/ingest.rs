//! Ingestion adapter: glue between the messaging gateway and the pipeline.
//!
//! Receives one inbound message, stores it raw, runs extraction and
//! materialization, and always produces an acknowledgement string for the
//! gateway to send back. Internal failures are logged and leave the message
//! in a retryable state — the field worker never sees an error.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{DbRawMessage, FarmDb, MSG_STATE_PROCESSED, MSG_STATE_RECEIVED};
use crate::extraction::{ExtractionEngine, ExtractionOutcome};
use crate::materialize::materialize_extraction;

/// One inbound message as the gateway hands it over.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_content_type: Option<String>,
}

/// Process one inbound message end to end. Always returns the acknowledgement
/// body — extraction faults fall back internally and storage faults leave the
/// message retryable, but the sender gets a reply either way.
pub async fn process_inbound(
    db: &FarmDb,
    engine: &ExtractionEngine,
    msg: &InboundMessage,
    today: NaiveDate,
) -> String {
    let raw = DbRawMessage {
        id: format!("rm-{}", Uuid::new_v4()),
        message_id: msg.message_id.clone(),
        from_contact: Some(msg.from.clone()),
        body: Some(msg.body.clone()),
        message_type: if msg.media_url.is_some() {
            "image".to_string()
        } else {
            "text".to_string()
        },
        media_url: msg.media_url.clone(),
        media_content_type: msg.media_content_type.clone(),
        state: MSG_STATE_RECEIVED.to_string(),
        received_at: FarmDb::now(),
        processed_at: None,
        extracted_json: None,
        linked_activity_id: None,
    };

    match db.insert_raw_message(&raw) {
        Ok(true) => {}
        Ok(false) => {
            // Gateway retry. If the first delivery finished, answer from its
            // stored outcome instead of re-running the pipeline.
            match db.get_raw_message(&msg.message_id) {
                Ok(Some(existing)) if existing.state == MSG_STATE_PROCESSED => {
                    log::info!("Duplicate delivery of {}; re-acknowledging", msg.message_id);
                    let outcome = existing
                        .extracted_json
                        .as_deref()
                        .and_then(|j| serde_json::from_str::<ExtractionOutcome>(j).ok());
                    return match outcome {
                        Some(o) => build_acknowledgement(&o),
                        None => fallback_acknowledgement(),
                    };
                }
                Ok(_) => {
                    // First attempt didn't finish — run it again; every step
                    // downstream is idempotent.
                }
                Err(e) => {
                    log::error!("Failed to look up duplicate {}: {}", msg.message_id, e);
                    return fallback_acknowledgement();
                }
            }
        }
        Err(e) => {
            log::error!("Failed to store message {}: {}", msg.message_id, e);
            return fallback_acknowledgement();
        }
    }

    let outcome = engine.extract(&msg.body, Some(&msg.from), today).await;

    if let Err(e) = materialize_extraction(db, &raw, &outcome, today) {
        // Storage fault: leave the message retryable. The worker picks it up
        // again; the sender still gets their acknowledgement.
        log::error!(
            "Materialization failed for {} (retryable: {}): {}",
            msg.message_id,
            e.is_retryable(),
            e
        );
        if let Err(mark_err) = db.mark_message_failed(&msg.message_id) {
            log::error!("Could not mark {} failed: {}", msg.message_id, mark_err);
        }
    }

    build_acknowledgement(&outcome)
}

/// Build the reply the field worker sees.
pub fn build_acknowledgement(outcome: &ExtractionOutcome) -> String {
    match &outcome.data {
        Some(data) => {
            let quantity = data
                .cladodes_planted
                .map(|n| n.to_string())
                .unwrap_or_else(|| "activity".to_string());
            let plot = data.plot_code.as_deref().unwrap_or("unknown");
            format!(
                "\u{2705} Received! Logged {} in Plot {}. AI confidence: {}%",
                quantity,
                plot,
                (outcome.confidence * 100.0).round() as i64
            )
        }
        None => fallback_acknowledgement(),
    }
}

fn fallback_acknowledgement() -> String {
    "\u{2705} Message received. Please include activity details like: \
     \"Planted 400 cladodes in Plot 2A with 6 workers\""
        .to_string()
}
