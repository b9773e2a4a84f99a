//! Pipeline worker binary.
//!
//! Default mode reads gateway messages as JSON lines on stdin and writes one
//! acknowledgement line per message — the messaging gateway adapter pipes
//! through this. `--evaluate` runs one metric-alert evaluation pass and
//! exits (meant for a scheduler).

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

use fieldops_lib::alerts::engine::evaluate_metric_alerts;
use fieldops_lib::config::FarmConfig;
use fieldops_lib::db::FarmDb;
use fieldops_lib::extraction::{ExtractionEngine, HttpExtractionClient};
use fieldops_lib::ingest::{process_inbound, InboundMessage};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match FarmConfig::load_or_default() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    let db_path = match config.resolve_db_path() {
        Ok(p) => p,
        Err(e) => {
            log::error!("Config error: {}", e);
            std::process::exit(1);
        }
    };
    let db = match FarmDb::open_at(db_path) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let today = Utc::now().date_naive();

    if std::env::args().any(|a| a == "--evaluate") {
        match evaluate_metric_alerts(&db, &config, today) {
            Ok(summary) => log::info!(
                "Alert evaluation: {} created, {} refreshed, {} auto-resolved",
                summary.created,
                summary.refreshed,
                summary.auto_resolved
            ),
            Err(e) => {
                log::error!("Alert evaluation failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let client = match HttpExtractionClient::new(&config.extraction) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Extraction client error: {}", e);
            std::process::exit(1);
        }
    };
    let engine = ExtractionEngine::new(Box::new(client), &config.estimates);

    // Re-drive messages a previous run left unfinished (crash or storage
    // fault). Processing is idempotent, so replays are harmless; their acks
    // were already sent, so only log.
    match db.get_unprocessed_messages(100) {
        Ok(pending) if !pending.is_empty() => {
            log::info!("Re-driving {} unfinished messages", pending.len());
            for stored in pending {
                let msg = InboundMessage {
                    message_id: stored.message_id,
                    from: stored.from_contact.unwrap_or_default(),
                    body: stored.body.unwrap_or_default(),
                    media_url: stored.media_url,
                    media_content_type: stored.media_content_type,
                };
                let _ = process_inbound(&db, &engine, &msg, today).await;
            }
        }
        Ok(_) => {}
        Err(e) => log::warn!("Could not query unfinished messages: {}", e),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let msg: InboundMessage = match serde_json::from_str(line) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("Skipping malformed gateway line: {}", e);
                        continue;
                    }
                };
                let ack = process_inbound(&db, &engine, &msg, today).await;
                println!("{}", ack);
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("stdin read error: {}", e);
                break;
            }
        }
    }
}
