use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::models::monitor::{PowerflowReading, StationInfo};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Outcome of one sync or ingestion attempt, recorded in `sync_log`.
/// Diagnostic only; nothing reads it back for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Failed => "FAILED",
        }
    }
}

/// A raw upstream response headed for the cache table.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub cache_key: String,
    pub response_body: String,
    pub status_code: i32,
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: i32,
}

/// A cache row as read back for ingestion.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CacheEntryRow {
    pub id: i64,
    pub cache_key: String,
    pub response_body: Option<String>,
    pub status_code: Option<i32>,
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SyncLogRow {
    pub id: i64,
    pub station_id: Option<i64>,
    pub status: String,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Raw response cache --

    /// Idempotent write keyed on `cache_key`: a re-fetch of the same upstream
    /// moment overwrites body/status/timestamp instead of duplicating.
    pub async fn upsert_cache_entry(&self, entry: &NewCacheEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO external_api_cache
                   (cache_key, response_body, status_code, error_message, fetched_at, ttl_seconds)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (cache_key) DO UPDATE
                   SET response_body = EXCLUDED.response_body,
                       status_code   = EXCLUDED.status_code,
                       error_message = EXCLUDED.error_message,
                       fetched_at    = EXCLUDED.fetched_at,
                       ttl_seconds   = EXCLUDED.ttl_seconds"#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.response_body)
        .bind(entry.status_code)
        .bind(&entry.error_message)
        .bind(entry.fetched_at)
        .bind(entry.ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All cache rows strictly newer than the cursor, oldest first. With no
    /// cursor the whole table is returned (first ingestion run).
    pub async fn cache_entries_newer_than(
        &self,
        cursor: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<CacheEntryRow>> {
        let rows = match cursor {
            Some(after) => {
                sqlx::query_as::<_, CacheEntryRow>(
                    "SELECT id, cache_key, response_body, status_code, error_message, fetched_at, ttl_seconds
                     FROM external_api_cache
                     WHERE fetched_at > $1
                     ORDER BY fetched_at ASC",
                )
                .bind(after)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CacheEntryRow>(
                    "SELECT id, cache_key, response_body, status_code, error_message, fetched_at, ttl_seconds
                     FROM external_api_cache
                     ORDER BY fetched_at ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    // -- Ingestion cursor --

    pub async fn cursor_position(&self, cursor_id: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT last_fetched_at FROM ingestion_cursor WHERE id = $1",
        )
        .bind(cursor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.flatten())
    }

    /// Advance the watermark. The conditional update makes monotonicity a
    /// store guarantee: an advance to an older timestamp is a no-op.
    pub async fn advance_cursor(
        &self,
        cursor_id: &str,
        last_fetched_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO ingestion_cursor (id, last_fetched_at)
               VALUES ($1, $2)
               ON CONFLICT (id) DO UPDATE
                   SET last_fetched_at = EXCLUDED.last_fetched_at
                   WHERE ingestion_cursor.last_fetched_at IS NULL
                      OR ingestion_cursor.last_fetched_at < EXCLUDED.last_fetched_at"#,
        )
        .bind(cursor_id)
        .bind(last_fetched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Domain tables --

    /// Upsert a station by its natural key and return its row id. Mutable
    /// attributes are overwritten on every sync.
    pub async fn upsert_station(&self, info: &StationInfo) -> anyhow::Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO power_station
                   (stationname, address, latitude, longitude, capacity_kwp,
                    battery_capacity_kwh, powerstation_type, status, org_name,
                    org_code, charts_type, time_span, is_powerflow, is_stored,
                    turnon_time, create_time)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
               ON CONFLICT (stationname) DO UPDATE
                   SET address              = EXCLUDED.address,
                       latitude             = EXCLUDED.latitude,
                       longitude            = EXCLUDED.longitude,
                       capacity_kwp         = EXCLUDED.capacity_kwp,
                       battery_capacity_kwh = EXCLUDED.battery_capacity_kwh,
                       powerstation_type    = EXCLUDED.powerstation_type,
                       status               = EXCLUDED.status,
                       org_name             = EXCLUDED.org_name,
                       org_code             = EXCLUDED.org_code,
                       charts_type          = EXCLUDED.charts_type,
                       time_span            = EXCLUDED.time_span,
                       is_powerflow         = EXCLUDED.is_powerflow,
                       is_stored            = EXCLUDED.is_stored,
                       turnon_time          = EXCLUDED.turnon_time,
                       create_time          = EXCLUDED.create_time
               RETURNING id"#,
        )
        .bind(&info.stationname)
        .bind(&info.address)
        .bind(info.latitude)
        .bind(info.longitude)
        .bind(info.capacity_kwp)
        .bind(info.battery_capacity_kwh)
        .bind(&info.powerstation_type)
        .bind(&info.status)
        .bind(&info.org_name)
        .bind(&info.org_code)
        .bind(&info.charts_type)
        .bind(&info.time_span)
        .bind(info.is_powerflow)
        .bind(info.is_stored)
        .bind(info.turnon_time)
        .bind(info.create_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert a snapshot unless one already exists for `(station, timestamp)`.
    /// Returns whether a row was written; a replay is a no-op, not an error.
    pub async fn insert_snapshot_if_absent(
        &self,
        station_id: i64,
        timestamp: DateTime<Utc>,
        reading: &PowerflowReading,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO powerflow_snapshot
                   (station_id, powerflow_timestamp, pv_w, battery_w, load_w, grid_w,
                    genset_w, microgrid_w, soc_percent, pv_status, battery_status,
                    load_status, grid_status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
               ON CONFLICT (station_id, powerflow_timestamp) DO NOTHING"#,
        )
        .bind(station_id)
        .bind(timestamp)
        .bind(reading.pv_w)
        .bind(reading.battery_w)
        .bind(reading.load_w)
        .bind(reading.grid_w)
        .bind(reading.genset_w)
        .bind(reading.microgrid_w)
        .bind(reading.soc_percent)
        .bind(&reading.pv_status)
        .bind(&reading.battery_status)
        .bind(&reading.load_status)
        .bind(&reading.grid_status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Sync log --

    pub async fn record_sync(
        &self,
        station_id: Option<i64>,
        status: SyncStatus,
        message: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sync_log (station_id, status, message, occurred_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(station_id)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_sync_logs(&self, limit: i64) -> anyhow::Result<Vec<SyncLogRow>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            "SELECT id, station_id, status, message, occurred_at
             FROM sync_log
             ORDER BY occurred_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
