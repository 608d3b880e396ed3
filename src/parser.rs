/// Parses kill-feed lines into typed `DeathEvent`s.
///
/// The game server writes one JSON object per line:
///
///   {"victim_id":"5f0c…","victim_name":"Zombie","victim_kind":"minecraft:zombie",
///    "killer_name":"Alex","killer_id":"9b1e…","killer_kind":"minecraft:player",
///    "x":12.4,"y":64.0,"z":-30.2,"dimension":"minecraft:overworld",
///    "death_message":"Zombie was slain by Alex","damage_source":"player"}
///
/// Only `victim_name` and `victim_kind` are required. A missing `timestamp`
/// is stamped with the arrival time.
use crate::{
    clock::Clock,
    event::{DeathEvent, Location},
};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("blank line")]
    Blank,

    #[error("malformed feed record: {0}")]
    Json(#[from] serde_json::Error),
}

// Wire shape (private) — converted into DeathEvent via the builder.
#[derive(Deserialize)]
struct FeedRecord {
    victim_id:     Option<Uuid>,
    victim_name:   String,
    victim_kind:   String,
    timestamp:     Option<u64>,
    killer_name:   Option<String>,
    killer_id:     Option<Uuid>,
    killer_kind:   Option<String>,
    #[serde(default)]
    x:             f64,
    #[serde(default)]
    y:             f64,
    #[serde(default)]
    z:             f64,
    dimension:     Option<String>,
    death_message: Option<String>,
    #[serde(default)]
    damage_source: String,
}

pub fn parse_line(raw: &str, now: u64) -> Result<DeathEvent, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::Blank);
    }
    let rec: FeedRecord = serde_json::from_str(raw)?;

    let mut builder = DeathEvent::builder()
        .victim(rec.victim_name, rec.victim_kind)
        .location(Location::new(rec.x, rec.y, rec.z, rec.dimension.as_deref()))
        .damage_source(rec.damage_source);

    if let Some(id) = rec.victim_id {
        builder = builder.victim_id(id);
    }
    if let Some(name) = rec.killer_name.filter(|n| !n.is_empty()) {
        builder = builder.killer_name(name);
    }
    if let Some(id) = rec.killer_id {
        builder = builder.killer_id(id);
    }
    if let Some(kind) = rec.killer_kind {
        builder = builder.killer_kind(kind);
    }
    if let Some(message) = rec.death_message {
        builder = builder.death_message(message);
    }

    Ok(builder.build(rec.timestamp.unwrap_or(now)))
}

/// Async pipeline task: receive raw lines, parse, forward typed events.
pub async fn run(mut rx: Receiver<String>, tx: Sender<DeathEvent>, clock: Arc<dyn Clock>) -> Result<()> {
    while let Some(line) = rx.recv().await {
        match parse_line(&line, clock.now_secs()) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(ParseError::Blank) => {}
            Err(e) => tracing::warn!("Skipping feed line: {}", e),
        }
    }
    Ok(())
}
