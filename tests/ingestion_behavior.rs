//! Behavior tests for the ingestion side: payload extraction, cache-key
//! fingerprints, and the watermark advancement that makes replay and
//! partial failure safe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

use collector::jobs::ingest::watermark_after;
use collector::jobs::sync::build_cache_key;
use collector::models::monitor::{upstream_timestamp, PowerflowReading, StationInfo};

fn monitor_payload() -> serde_json::Value {
    json!({
        "msg": "success",
        "data": {
            "info": {
                "stationname": "Rooftop West",
                "address": "Via Roma 1, Milano",
                "latitude": 45.4642,
                "longitude": 9.19,
                "capacity_kWp": 9.86,
                "battery_capacity_kWh": 11.6,
                "powerstation_type": "Residential",
                "status": "1",
                "org_name": "ACME Solar",
                "org_code": "acme",
                "charts_type": "3",
                "time_span": "2",
                "is_powerflow": true,
                "is_stored": true,
                "turnon_time": "15/03/2023 09:30:00",
                "create_time": "14/03/2023 18:00:00",
                "time": "05/08/2026 10:00:00"
            },
            "powerflow": {
                "pv": "1,766.08(W)",
                "bettery": "-250(W)",
                "load": "1766,08",
                "grid": 916,
                "genset": "0(W)",
                "microgrid": "--",
                "soc": "55%",
                "pvStatus": "-1",
                "betteryStatus": "1",
                "loadStatus": "1",
                "gridStatus": "-1",
                "time": "05/08/2026 10:05:00"
            }
        }
    })
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

// ── Payload extraction ──────────────────────────────────────

#[test]
fn test_full_payload_station_extraction() {
    let payload = monitor_payload();
    let info = StationInfo::parse(&payload["data"]["info"]).unwrap();

    assert_eq!(info.stationname, "Rooftop West");
    assert_eq!(info.org_code.as_deref(), Some("acme"));
    assert_eq!(info.capacity_kwp, Some(9.86));
    assert_eq!(info.battery_capacity_kwh, Some(11.6));
    assert!(info.is_powerflow && info.is_stored);
    assert_eq!(
        info.turnon_time.unwrap().to_rfc3339(),
        "2023-03-15T09:30:00+00:00"
    );
}

#[test]
fn test_full_payload_powerflow_extraction() {
    let payload = monitor_payload();
    let reading = PowerflowReading::parse(&payload["data"]["powerflow"]).unwrap();

    // Mixed-separator, comma-decimal, plain-number and placeholder values
    // all normalize through the same coercion.
    assert_eq!(reading.pv_w, Some(Decimal::from_str("1766.08").unwrap()));
    assert_eq!(reading.battery_w, Some(Decimal::from_str("-250").unwrap()));
    assert_eq!(reading.load_w, Some(Decimal::from_str("1766.08").unwrap()));
    assert_eq!(reading.grid_w, Some(Decimal::from_str("916").unwrap()));
    assert_eq!(reading.microgrid_w, None);
    assert_eq!(reading.soc_percent, Some(Decimal::from_str("55").unwrap()));
    assert_eq!(reading.battery_status.as_deref(), Some("1"));
}

#[test]
fn test_payload_without_station_info_fails_parse() {
    let payload = json!({ "msg": "success", "data": { "powerflow": {} } });
    assert!(StationInfo::parse(&payload["data"]["info"]).is_err());
}

// ── Cache-key fingerprint ───────────────────────────────────

#[test]
fn test_refetching_same_upstream_moment_yields_same_key() {
    let payload = monitor_payload();
    let first = build_cache_key("station-1", &payload, ts("2026-08-05T10:05:10Z"));
    let second = build_cache_key("station-1", &payload, ts("2026-08-05T10:06:40Z"));
    // Fetch time differs but the portal timestamp is the same moment.
    assert_eq!(first, second);
    assert_eq!(first, "powerflow:station-1:05/08/2026 10:05:00");
}

#[test]
fn test_cache_key_prefers_powerflow_time_over_info_time() {
    assert_eq!(
        upstream_timestamp(&monitor_payload()).as_deref(),
        Some("05/08/2026 10:05:00")
    );
}

#[test]
fn test_cache_key_without_upstream_time_uses_fetch_time() {
    let payload = json!({ "msg": "success", "data": { "info": { "stationname": "S" } } });
    let fetched_at = ts("2026-08-05T10:05:00Z");
    let key = build_cache_key("station-1", &payload, fetched_at);
    assert_eq!(
        key,
        format!("powerflow:station-1:{}", fetched_at.to_rfc3339())
    );
}

// ── Watermark advancement ───────────────────────────────────

/// Rows t1 < t2 < t3 where t2 fails: the watermark reaches t3 when t1 and t3
/// succeed, but a failing tail pins it at the last chronological success.
#[test]
fn test_watermark_with_mid_row_failure() {
    let t1 = ts("2026-08-05T10:00:00Z");
    let t3 = ts("2026-08-05T10:10:00Z");

    // t1 and t3 succeeded, t2 failed.
    assert_eq!(watermark_after(None, &[t1, t3]), Some(t3));

    // t2 and t3 both failed: only t1 counts.
    assert_eq!(watermark_after(None, &[t1]), Some(t1));

    // Everything failed: the cursor stays put and the cycle will re-read.
    let cursor = Some(ts("2026-08-05T09:55:00Z"));
    assert_eq!(watermark_after(cursor, &[]), cursor);
}

#[test]
fn test_watermark_never_moves_backwards() {
    let cursor = Some(ts("2026-08-05T10:30:00Z"));
    assert_eq!(
        watermark_after(cursor, &[ts("2026-08-05T10:00:00Z")]),
        cursor
    );
}
