use serde::Deserialize;

/// Which background loops this process runs.
///
/// A split deployment runs one `collector` process (fetch → cache) and one
/// `ingest` process (cache → domain tables); `all` runs both loops in a
/// single process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Collector,
    Ingest,
    All,
}

impl Role {
    pub fn runs_collector(self) -> bool {
        matches!(self, Role::Collector | Role::All)
    }

    pub fn runs_ingest(self) -> bool {
        matches!(self, Role::Ingest | Role::All)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: Option<String>,
    /// Base URL of the SEMS portal API, e.g. https://eu.semsportal.com/api/v2
    pub sems_base_url: String,
    pub sems_account: String,
    pub sems_password: String,
    pub sems_station_id: String,
    /// Client-metadata strings the portal expects in its token headers.
    pub sems_client: String,
    pub sems_version: String,
    pub sems_language: String,
    /// Fixed delay between fetch cycles. Default: 300s.
    pub sync_interval_secs: u64,
    /// Fixed delay between ingestion cycles. Default: 300s.
    pub ingest_interval_secs: u64,
    /// Identifier of the ingestion watermark row.
    pub cursor_id: String,
    pub role: Role,
    /// When set, the sync cycle parses and persists directly instead of
    /// writing to the raw-response cache.
    pub direct_persist: bool,
}

impl Config {
    /// Returns the key expected on admin API calls, if one is configured.
    pub fn admin_key(&self) -> Option<&str> {
        self.admin_key.as_deref()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let sems_account = std::env::var("SEMS_ACCOUNT")
        .map_err(|_| anyhow::anyhow!("SEMS_ACCOUNT is not set"))?;
    let sems_password = std::env::var("SEMS_PASSWORD")
        .map_err(|_| anyhow::anyhow!("SEMS_PASSWORD is not set"))?;
    let sems_station_id = std::env::var("SEMS_STATION_ID")
        .map_err(|_| anyhow::anyhow!("SEMS_STATION_ID is not set"))?;

    let role = match std::env::var("PVSYNC_ROLE").as_deref() {
        Ok("collector") => Role::Collector,
        Ok("ingest") => Role::Ingest,
        Ok("all") | Err(_) => Role::All,
        Ok(other) => anyhow::bail!("invalid PVSYNC_ROLE: {} (collector|ingest|all)", other),
    };

    Ok(Config {
        port: std::env::var("PVSYNC_PORT")
            .unwrap_or_else(|_| "8090".into())
            .parse()
            .unwrap_or(8090),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/pvsync".into()),
        admin_key: std::env::var("PVSYNC_ADMIN_KEY").ok(),
        sems_base_url: std::env::var("SEMS_BASE_URL")
            .unwrap_or_else(|_| "https://eu.semsportal.com/api/v2".into()),
        sems_account,
        sems_password,
        sems_station_id,
        sems_client: std::env::var("SEMS_CLIENT").unwrap_or_else(|_| "ios".into()),
        sems_version: std::env::var("SEMS_VERSION").unwrap_or_else(|_| "v2.1.0".into()),
        sems_language: std::env::var("SEMS_LANGUAGE").unwrap_or_else(|_| "en".into()),
        sync_interval_secs: std::env::var("PVSYNC_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        ingest_interval_secs: std::env::var("PVSYNC_INGEST_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        cursor_id: std::env::var("PVSYNC_CURSOR_ID")
            .unwrap_or_else(|_| "cache_ingestion_global".into()),
        role,
        direct_persist: std::env::var("COLLECTOR_DIRECT_PERSIST")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false),
    })
}
