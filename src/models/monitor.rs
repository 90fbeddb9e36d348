//! Parsed views of the portal's monitor-detail payload.
//!
//! The payload is deliberately kept as raw JSON until ingestion time; these
//! types extract the station-info and powerflow sub-objects, tolerating the
//! portal's habit of sending numbers as locale-formatted strings and its
//! creative field spellings (`bettery`, `betteryStatus`).

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::numeric::coerce_decimal;

/// Station timestamps arrive as "dd/MM/yyyy HH:mm:ss".
const STATION_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Station master data from `data.info`. Mutable attributes are overwritten
/// on every sync; identity is the station name.
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub stationname: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity_kwp: Option<f64>,
    pub battery_capacity_kwh: Option<f64>,
    pub powerstation_type: Option<String>,
    pub status: Option<String>,
    pub org_name: Option<String>,
    pub org_code: Option<String>,
    pub charts_type: Option<String>,
    pub time_span: Option<String>,
    pub is_powerflow: bool,
    pub is_stored: bool,
    pub turnon_time: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
}

impl StationInfo {
    /// Parse the `data.info` node. The node itself and the station name are
    /// required; everything else is optional.
    pub fn parse(info: &Value) -> anyhow::Result<Self> {
        let obj = info
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("station info missing from payload"))?;

        let stationname = obj
            .get("stationname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if stationname.is_empty() {
            anyhow::bail!("station info has no stationname");
        }

        Ok(Self {
            stationname,
            address: text(info, "address"),
            latitude: number(info, "latitude"),
            longitude: number(info, "longitude"),
            capacity_kwp: number(info, "capacity_kWp"),
            battery_capacity_kwh: number(info, "battery_capacity_kWh"),
            powerstation_type: text(info, "powerstation_type"),
            status: text(info, "status"),
            org_name: text(info, "org_name"),
            org_code: text(info, "org_code"),
            charts_type: text(info, "charts_type"),
            time_span: text(info, "time_span"),
            is_powerflow: info
                .get("is_powerflow")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            is_stored: info
                .get("is_stored")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            turnon_time: station_time(info, "turnon_time"),
            create_time: station_time(info, "create_time"),
        })
    }
}

/// A point-in-time powerflow reading from `data.powerflow`. All power values
/// are watts; `soc_percent` is the battery state of charge.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerflowReading {
    pub pv_w: Option<Decimal>,
    pub battery_w: Option<Decimal>,
    pub load_w: Option<Decimal>,
    pub grid_w: Option<Decimal>,
    pub genset_w: Option<Decimal>,
    pub microgrid_w: Option<Decimal>,
    pub soc_percent: Option<Decimal>,
    pub pv_status: Option<String>,
    pub battery_status: Option<String>,
    pub load_status: Option<String>,
    pub grid_status: Option<String>,
}

impl PowerflowReading {
    /// Parse the `data.powerflow` node. A missing node means the station has
    /// no powerflow view; that is not an error.
    pub fn parse(powerflow: &Value) -> Option<Self> {
        powerflow.as_object()?;
        Some(Self {
            pv_w: field_decimal(powerflow, "pv"),
            battery_w: field_decimal(powerflow, "bettery"),
            load_w: field_decimal(powerflow, "load"),
            grid_w: field_decimal(powerflow, "grid"),
            genset_w: field_decimal(powerflow, "genset"),
            microgrid_w: field_decimal(powerflow, "microgrid"),
            soc_percent: field_decimal(powerflow, "soc"),
            pv_status: text(powerflow, "pvStatus"),
            battery_status: text(powerflow, "betteryStatus"),
            load_status: text(powerflow, "loadStatus"),
            grid_status: text(powerflow, "gridStatus"),
        })
    }
}

/// The portal's own timestamp for this payload: `data.powerflow.time`,
/// falling back to `data.info.time`. Used for the cache-key fingerprint so a
/// re-fetch of the same upstream moment overwrites rather than duplicates.
pub fn upstream_timestamp(payload: &Value) -> Option<String> {
    let data = payload.get("data")?;
    for node in [data.get("powerflow"), data.get("info")].into_iter().flatten() {
        if let Some(time) = node.get("time").and_then(Value::as_str) {
            if !time.trim().is_empty() {
                return Some(time.to_string());
            }
        }
    }
    None
}

fn text(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(node: &Value, key: &str) -> Option<f64> {
    node.get(key).and_then(Value::as_f64)
}

fn field_decimal(node: &Value, key: &str) -> Option<Decimal> {
    node.get(key).and_then(|v| coerce_decimal(v))
}

fn station_time(node: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = node.get(key).and_then(Value::as_str)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, STATION_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}
