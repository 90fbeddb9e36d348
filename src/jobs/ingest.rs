//! Background job: drain new raw-cache rows into the domain tables.
//!
//! Each cycle reads the watermark, processes every cache row fetched after
//! it, and advances the watermark to the newest row that was processed
//! without error. Row failures are logged and skipped so one bad payload
//! never blocks the stream; those rows are retried on the next cycle because
//! the watermark does not move past them until everything before them
//! succeeded. Replays are safe: station upsert and snapshot insert are both
//! idempotent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time;
use tracing::{debug, info, warn};

use crate::models::monitor::{PowerflowReading, StationInfo};
use crate::store::postgres::{CacheEntryRow, SyncStatus};
use crate::AppState;

/// What happened to one cache row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Station and snapshot written.
    Persisted,
    /// Snapshot already existed for this `(station, timestamp)`; replay no-op.
    Duplicate,
    /// Row carried an upstream error, an empty body, or no powerflow view.
    Skipped,
}

/// Counters for one ingestion cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub fetched: usize,
    pub persisted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Spawn the background ingestion task. Call this once at startup.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(state.config.ingest_interval_secs));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = run_ingest_cycle(&state).await {
                warn!("scheduled ingestion cycle failed: {:#}", e);
            }
        }
    });
}

/// Run one ingestion cycle.
pub async fn run_ingest_cycle(state: &AppState) -> anyhow::Result<IngestReport> {
    let cursor_id = state.config.cursor_id.as_str();
    let cursor = state.db.cursor_position(cursor_id).await?;
    let entries = state.db.cache_entries_newer_than(cursor).await?;
    if entries.is_empty() {
        debug!("no cache rows newer than cursor");
        return Ok(IngestReport::default());
    }

    let mut report = IngestReport {
        fetched: entries.len(),
        ..IngestReport::default()
    };
    let mut processed_at: Vec<DateTime<Utc>> = Vec::new();

    for entry in &entries {
        match ingest_entry(state, entry).await {
            Ok(outcome) => {
                processed_at.push(entry.fetched_at);
                match outcome {
                    RowOutcome::Persisted => report.persisted += 1,
                    RowOutcome::Duplicate => report.duplicates += 1,
                    RowOutcome::Skipped => report.skipped += 1,
                }
            }
            Err(e) => {
                warn!(cache_key = %entry.cache_key, "failed to ingest cache entry: {:#}", e);
                report.failed += 1;
            }
        }
    }

    if let Some(watermark) = watermark_after(cursor, &processed_at) {
        if Some(watermark) != cursor {
            state.db.advance_cursor(cursor_id, watermark).await?;
        }
    }

    info!(
        fetched = report.fetched,
        persisted = report.persisted,
        duplicates = report.duplicates,
        skipped = report.skipped,
        failed = report.failed,
        "ingestion cycle complete"
    );
    Ok(report)
}

/// The watermark after a cycle: the maximum `fetched_at` among rows processed
/// without error, or the old cursor when nothing succeeded. Failed rows never
/// move the watermark, so they are re-read next cycle.
pub fn watermark_after(
    cursor: Option<DateTime<Utc>>,
    processed: &[DateTime<Utc>],
) -> Option<DateTime<Utc>> {
    processed.iter().copied().fold(cursor, |acc, ts| match acc {
        Some(current) if current >= ts => Some(current),
        _ => Some(ts),
    })
}

async fn ingest_entry(state: &AppState, entry: &CacheEntryRow) -> anyhow::Result<RowOutcome> {
    if let Some(code) = entry.status_code {
        if code >= 400 {
            debug!(cache_key = %entry.cache_key, status = code, "skipping cache row with upstream error");
            return Ok(RowOutcome::Skipped);
        }
    }
    let Some(body) = entry.response_body.as_deref().filter(|b| !b.is_empty()) else {
        debug!(cache_key = %entry.cache_key, "skipping cache row without payload");
        return Ok(RowOutcome::Skipped);
    };

    let payload: Value = serde_json::from_str(body)
        .with_context(|| format!("cache row {} is not valid JSON", entry.cache_key))?;
    persist_payload(state, &payload, entry.fetched_at).await
}

/// Parse a monitor-detail payload and persist station + snapshot. Shared by
/// the ingestion loop and the collector's direct-persist mode.
pub async fn persist_payload(
    state: &AppState,
    payload: &Value,
    snapshot_at: DateTime<Utc>,
) -> anyhow::Result<RowOutcome> {
    let null = Value::Null;
    let info = StationInfo::parse(payload.pointer("/data/info").unwrap_or(&null))?;
    let station_id = state.db.upsert_station(&info).await?;

    let outcome = match PowerflowReading::parse(payload.pointer("/data/powerflow").unwrap_or(&null)) {
        Some(reading) => {
            if state
                .db
                .insert_snapshot_if_absent(station_id, snapshot_at, &reading)
                .await?
            {
                RowOutcome::Persisted
            } else {
                RowOutcome::Duplicate
            }
        }
        None => {
            debug!(station = %info.stationname, "payload has no powerflow view");
            RowOutcome::Skipped
        }
    };

    state
        .db
        .record_sync(Some(station_id), SyncStatus::Success, None)
        .await?;
    Ok(outcome)
}
