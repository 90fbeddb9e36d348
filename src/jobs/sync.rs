//! Background job: fetch the current monitor detail from the portal and
//! durably cache the raw payload.
//!
//! Runs on a fixed delay. Each cycle is independent: a failed cycle is
//! recorded in `sync_log` and the next tick runs regardless. Auth failures
//! are terminal for the cycle (re-logging-in again would not help); only
//! transient upstream errors are retried, with bounded backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use tokio::time::{self, sleep};
use tracing::{debug, error, warn};

use crate::errors::SemsError;
use crate::models::monitor::upstream_timestamp;
use crate::sems::client::SemsClient;
use crate::store::postgres::{NewCacheEntry, SyncStatus};
use crate::AppState;

/// Advisory TTL stamped on cache rows. No reaper enforces it today.
pub const DEFAULT_TTL_SECONDS: i32 = 300;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 10_000;
const JITTER_MS: u64 = 250;

/// Spawn the background sync task. Call this once at startup.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(state.config.sync_interval_secs));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = run_sync_cycle(&state).await {
                warn!("scheduled sync cycle failed: {:#}", e);
            }
        }
    });
}

/// Run one fetch cycle: pull the monitor detail and either cache the raw
/// payload (default) or parse-and-persist directly (fallback mode).
pub async fn run_sync_cycle(state: &AppState) -> anyhow::Result<()> {
    let payload = match fetch_with_retry(&state.sems).await {
        Ok(payload) => payload,
        Err(e) => {
            record_failure(state, &e.to_string()).await;
            return Err(e.into());
        }
    };
    let fetched_at = Utc::now();

    if state.config.direct_persist {
        if let Err(e) = crate::jobs::ingest::persist_payload(state, &payload, fetched_at).await {
            record_failure(state, &format!("direct persist failed: {e:#}")).await;
            return Err(e);
        }
        return Ok(());
    }

    let entry = NewCacheEntry {
        cache_key: build_cache_key(&state.config.sems_station_id, &payload, fetched_at),
        response_body: payload.to_string(),
        status_code: 200,
        error_message: None,
        fetched_at,
        ttl_seconds: DEFAULT_TTL_SECONDS,
    };
    if let Err(e) = state.db.upsert_cache_entry(&entry).await {
        record_failure(state, &format!("cache write failed: {e:#}")).await;
        return Err(e);
    }
    debug!(cache_key = %entry.cache_key, "stored portal payload in cache");

    state.db.record_sync(None, SyncStatus::Success, None).await?;
    Ok(())
}

/// Deterministic fingerprint of "the same upstream moment": station id plus
/// the portal's own payload timestamp, falling back to fetch time when the
/// portal omits it. Re-fetching the same moment overwrites its cache row.
pub fn build_cache_key(station_id: &str, payload: &Value, fetched_at: DateTime<Utc>) -> String {
    let ts = upstream_timestamp(payload).unwrap_or_else(|| fetched_at.to_rfc3339());
    format!("powerflow:{station_id}:{ts}")
}

async fn fetch_with_retry(sems: &SemsClient) -> Result<Value, SemsError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match sems.fetch_monitor_detail().await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_retryable() && attempt < MAX_FETCH_ATTEMPTS => {
                let wait = backoff(attempt);
                warn!(
                    "fetch attempt {}/{} failed: {}. retrying in {:?}",
                    attempt, MAX_FETCH_ATTEMPTS, e, wait
                );
                sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff with a small jitter so split deployments don't hammer
/// the portal in lockstep.
fn backoff(attempt: u32) -> Duration {
    let raw = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let jitter = rand::thread_rng().gen_range(0..=JITTER_MS);
    Duration::from_millis(raw.min(MAX_BACKOFF_MS) + jitter)
}

async fn record_failure(state: &AppState, message: &str) {
    if let Err(log_err) = state
        .db
        .record_sync(None, SyncStatus::Failed, Some(message))
        .await
    {
        error!("failed to record sync failure: {}", log_err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_uses_upstream_timestamp() {
        let payload = json!({
            "data": { "powerflow": { "time": "08/05/2026 10:05:00" } }
        });
        let fetched_at = Utc::now();
        assert_eq!(
            build_cache_key("station-1", &payload, fetched_at),
            "powerflow:station-1:08/05/2026 10:05:00"
        );
    }

    #[test]
    fn test_cache_key_falls_back_to_fetch_time() {
        let fetched_at: DateTime<Utc> = "2026-08-05T10:05:00Z".parse().unwrap();
        let key = build_cache_key("station-1", &json!({"data": {}}), fetched_at);
        assert_eq!(key, format!("powerflow:station-1:{}", fetched_at.to_rfc3339()));
    }

    #[test]
    fn test_same_upstream_moment_yields_same_key() {
        let payload = json!({
            "data": { "powerflow": { "time": "08/05/2026 10:05:00" } }
        });
        let a = build_cache_key("s", &payload, Utc::now());
        let b = build_cache_key("s", &payload, Utc::now());
        assert_eq!(a, b);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        // Jitter adds at most JITTER_MS on top of the deterministic base.
        assert!(backoff(1) >= Duration::from_millis(500));
        assert!(backoff(1) <= Duration::from_millis(500 + JITTER_MS));
        assert!(backoff(2) >= Duration::from_millis(1000));
        assert!(backoff(10) <= Duration::from_millis(MAX_BACKOFF_MS + JITTER_MS));
    }
}
