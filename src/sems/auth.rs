//! Portal login handshake and session-token lifecycle.
//!
//! The portal returns HTTP 200 on some login failures too, so success is
//! decided by inspecting the body for a non-empty session token, never by
//! status alone.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::errors::SemsError;

/// How long a freshly issued session token is assumed to live.
const TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// A token this close to expiry is not handed out; it could expire mid-flight.
const SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// An issued session token. Immutable; replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct SemsToken {
    pub uid: String,
    pub timestamp: i64,
    pub token: String,
    expires_at: Instant,
}

impl SemsToken {
    fn is_valid(&self) -> bool {
        Instant::now() + SAFETY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    msg: Option<String>,
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    uid: Option<String>,
    timestamp: Option<i64>,
    token: Option<String>,
}

/// Performs the `/Common/CrossLogin` handshake.
///
/// The login call carries the client-metadata header only; the session-token
/// header is never attached to it.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    account: String,
    password: String,
    client_id: String,
    version: String,
    language: String,
}

impl AuthClient {
    pub fn new(
        base_url: impl Into<String>,
        account: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        version: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into(),
            account: account.into(),
            password: password.into(),
            client_id: client_id.into(),
            version: version.into(),
            language: language.into(),
        }
    }

    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self::new(
            cfg.sems_base_url.clone(),
            cfg.sems_account.clone(),
            cfg.sems_password.clone(),
            cfg.sems_client.clone(),
            cfg.sems_version.clone(),
            cfg.sems_language.clone(),
        )
    }

    /// Authenticate against the portal. Every failure mode (network error,
    /// timeout, malformed body, token missing from the body) is an auth
    /// failure; the caller decides whether the cycle survives it.
    pub async fn login(&self) -> Result<SemsToken, SemsError> {
        let resp = self
            .http
            .post(format!("{}/Common/CrossLogin", self.base_url))
            .header("Token", self.metadata_header())
            .json(&json!({ "account": self.account, "pwd": self.password }))
            .send()
            .await
            .map_err(|e| SemsError::Auth(format!("login request failed: {e}")))?;

        let body: LoginResponse = resp
            .json()
            .await
            .map_err(|e| SemsError::Auth(format!("malformed login response: {e}")))?;

        let data = body.data.unwrap_or(LoginData {
            uid: None,
            timestamp: None,
            token: None,
        });
        let token = data.token.unwrap_or_default();
        if token.is_empty() {
            let msg = body.msg.unwrap_or_else(|| "no message".into());
            return Err(SemsError::Auth(format!("login rejected: {msg}")));
        }

        Ok(SemsToken {
            uid: data.uid.unwrap_or_default(),
            timestamp: data.timestamp.unwrap_or_default(),
            token,
            expires_at: Instant::now() + TOKEN_LIFETIME,
        })
    }

    /// The `Token` header for the login call: client metadata only.
    pub fn metadata_header(&self) -> String {
        json!({
            "version": self.version,
            "client": self.client_id,
            "language": self.language,
        })
        .to_string()
    }

    /// The `token` header for data calls. The portal wants both `version` and
    /// `ver` populated.
    pub fn data_header(&self, tok: &SemsToken) -> String {
        json!({
            "uid": tok.uid,
            "timestamp": tok.timestamp,
            "token": tok.token,
            "client": self.client_id,
            "version": self.version,
            "ver": self.version,
            "language": self.language,
        })
        .to_string()
    }
}

/// Owns the current session token.
///
/// Reads of a still-valid token share a read lock; only the login/refresh
/// path serializes on `login_gate`, so a herd of cold callers produces
/// exactly one login request and then all observe the same token.
pub struct TokenStore {
    auth: AuthClient,
    current: RwLock<Option<SemsToken>>,
    login_gate: Mutex<()>,
}

impl TokenStore {
    pub fn new(auth: AuthClient) -> Self {
        Self {
            auth,
            current: RwLock::new(None),
            login_gate: Mutex::new(()),
        }
    }

    /// Serialized `token` header for a data call, logging in first if no
    /// valid token is cached.
    pub async fn token_header(&self) -> Result<String, SemsError> {
        if let Some(tok) = self.cached_valid() {
            return Ok(self.auth.data_header(&tok));
        }

        let _gate = self.login_gate.lock().await;
        // Another caller may have logged in while we waited on the gate.
        if let Some(tok) = self.cached_valid() {
            return Ok(self.auth.data_header(&tok));
        }

        let tok = self.auth.login().await?;
        let header = self.auth.data_header(&tok);
        *self.current.write().expect("token lock poisoned") = Some(tok);
        Ok(header)
    }

    /// Discard the cached token and re-authenticate. Called by the request
    /// pipeline when the portal signals an expired session.
    pub async fn force_refresh(&self) -> Result<(), SemsError> {
        let _gate = self.login_gate.lock().await;
        let tok = self.auth.login().await?;
        *self.current.write().expect("token lock poisoned") = Some(tok);
        Ok(())
    }

    fn cached_valid(&self) -> Option<SemsToken> {
        self.current
            .read()
            .expect("token lock poisoned")
            .as_ref()
            .filter(|t| t.is_valid())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(secs: u64) -> SemsToken {
        SemsToken {
            uid: "u-1".into(),
            timestamp: 1_700_000_000_123,
            token: "tok".into(),
            expires_at: Instant::now() + Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_token_valid_outside_safety_margin() {
        assert!(token_expiring_in(600).is_valid());
    }

    #[test]
    fn test_token_invalid_inside_safety_margin() {
        // 30s left is inside the 60s margin: would expire mid-flight.
        assert!(!token_expiring_in(30).is_valid());
    }

    #[test]
    fn test_metadata_header_has_no_session_fields() {
        let auth = AuthClient::new("http://x", "a", "p", "ios", "v2.1.0", "en");
        let parsed: serde_json::Value = serde_json::from_str(&auth.metadata_header()).unwrap();
        assert_eq!(parsed["client"], "ios");
        assert_eq!(parsed["version"], "v2.1.0");
        assert_eq!(parsed["language"], "en");
        assert!(parsed.get("uid").is_none());
        assert!(parsed.get("token").is_none());
    }

    #[test]
    fn test_data_header_carries_session_and_duplicate_ver() {
        let auth = AuthClient::new("http://x", "a", "p", "ios", "v2.1.0", "en");
        let tok = token_expiring_in(600);
        let parsed: serde_json::Value = serde_json::from_str(&auth.data_header(&tok)).unwrap();
        assert_eq!(parsed["uid"], "u-1");
        assert_eq!(parsed["token"], "tok");
        assert_eq!(parsed["timestamp"], 1_700_000_000_123i64);
        assert_eq!(parsed["version"], "v2.1.0");
        assert_eq!(parsed["ver"], "v2.1.0");
    }
}
