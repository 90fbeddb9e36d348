//! Typed operations against the portal's data API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use super::auth::TokenStore;
use super::pipeline::RequestPipeline;
use crate::errors::SemsError;

/// Client for the monitor-detail endpoint, with failure classification per
/// the retry policy: 429 and 5xx are transient, other non-2xx are terminal,
/// and a body that still signals expiry after the guarded retry is an auth
/// failure.
pub struct SemsClient {
    pipeline: RequestPipeline,
    base_url: String,
    station_id: String,
}

impl SemsClient {
    pub fn new(
        base_url: impl Into<String>,
        station_id: impl Into<String>,
        tokens: Arc<TokenStore>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build HTTP client");
        Self {
            pipeline: RequestPipeline::new(http, tokens),
            base_url: base_url.into(),
            station_id: station_id.into(),
        }
    }

    pub fn from_config(cfg: &crate::config::Config) -> Self {
        let auth = super::auth::AuthClient::from_config(cfg);
        Self::new(
            cfg.sems_base_url.clone(),
            cfg.sems_station_id.clone(),
            Arc::new(TokenStore::new(auth)),
        )
    }

    /// Fetch the current monitor detail (station info + powerflow) for the
    /// configured station.
    pub async fn fetch_monitor_detail(&self) -> Result<serde_json::Value, SemsError> {
        let url = format!(
            "{}/PowerStation/GetMonitorDetailByPowerstationId",
            self.base_url
        );
        let body = json!({ "powerStationId": self.station_id });
        let resp = self.pipeline.post_json(&url, &body).await?;

        if resp.status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SemsError::Transient("portal rate limit (HTTP 429)".into()));
        }
        if resp.status.is_server_error() {
            return Err(SemsError::Transient(format!(
                "portal server error {}",
                resp.status
            )));
        }
        if resp.signals_expiry() {
            // Still expired after the one guarded re-login: refreshing again
            // will not help.
            return Err(SemsError::Auth(
                "session still expired after re-login".into(),
            ));
        }
        if !resp.status.is_success() {
            return Err(SemsError::UnexpectedStatus(resp.status));
        }

        serde_json::from_slice(&resp.body).map_err(|e| SemsError::Malformed(e.to_string()))
    }
}
