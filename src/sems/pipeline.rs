//! Guarded re-authentication for outbound portal calls.
//!
//! Expiry shows up two ways: a plain HTTP 401, or an HTTP 200 whose JSON body
//! carries a "please log in again" message. Both trigger one token refresh
//! and one re-send per call; the second response is returned as-is. The
//! one-shot guard is a local flag on the call, so a wedged portal or bad
//! credentials can never cause a refresh loop.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;

use super::auth::TokenStore;
use crate::errors::SemsError;

/// Header name the portal expects the session token under.
pub const TOKEN_HEADER: &str = "token";

/// Lowercased fragments of the portal's session-expiry messages.
const EXPIRY_PHRASES: &[&str] = &[
    "authorization has expired",
    "login again",
    "re-login",
    "relogin",
];

/// A fully-read upstream response. The body is buffered exactly once per
/// attempt so expiry inspection here never exhausts it for the caller.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// True if this response still signals an expired session (by status or
    /// by body), i.e. re-authentication did not help.
    pub fn signals_expiry(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
            || (self.status.is_success() && body_signals_expiry(&self.body))
    }
}

/// Sends portal requests with the session token attached and at most one
/// refresh-and-resend per call.
pub struct RequestPipeline {
    http: reqwest::Client,
    tokens: Arc<TokenStore>,
}

impl RequestPipeline {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenStore>) -> Self {
        Self { http, tokens }
    }

    /// POST a JSON body to `url` with the current token header.
    ///
    /// On a 401 or an expiry-signaling 2xx body, refreshes the token and
    /// re-sends exactly once, then returns whatever came back. Transport
    /// failures surface as [`SemsError`]; non-auth HTTP failures are returned
    /// in the response for the caller to classify.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<UpstreamResponse, SemsError> {
        let mut retried = false;
        loop {
            let token_header = self.tokens.token_header().await?;
            let resp = self
                .http
                .post(url)
                .header(TOKEN_HEADER, token_header)
                .json(body)
                .send()
                .await?;
            let response = UpstreamResponse {
                status: resp.status(),
                body: resp.bytes().await?,
            };

            if response.signals_expiry() && !retried {
                debug!(status = %response.status, "portal session expired, refreshing token and retrying once");
                retried = true;
                self.tokens.force_refresh().await?;
                continue;
            }

            return Ok(response);
        }
    }
}

/// True if the body parses as JSON and its `msg` field contains one of the
/// known expiry phrases. Non-JSON bodies and JSON without `msg` are ordinary
/// payloads, not expiry signals.
pub fn body_signals_expiry(body: &[u8]) -> bool {
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    let Some(msg) = parsed.get("msg").and_then(|m| m.as_str()) else {
        return false;
    };
    let lower = msg.to_lowercase();
    EXPIRY_PHRASES.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_detected_in_standard_message() {
        let body = br#"{"msg":"The authorization has expired, please log in again.","data":null}"#;
        assert!(body_signals_expiry(body));
    }

    #[test]
    fn test_expiry_detection_is_case_insensitive() {
        let body = br#"{"msg":"Please RE-LOGIN to continue"}"#;
        assert!(body_signals_expiry(body));
    }

    #[test]
    fn test_ordinary_message_is_not_expiry() {
        let body = br#"{"msg":"success","data":{"info":{}}}"#;
        assert!(!body_signals_expiry(body));
    }

    #[test]
    fn test_non_json_body_is_not_expiry() {
        assert!(!body_signals_expiry(b"<html>502 Bad Gateway</html>"));
    }

    #[test]
    fn test_json_without_msg_is_not_expiry() {
        assert!(!body_signals_expiry(br#"{"data":{"pv":100}}"#));
    }

    #[test]
    fn test_non_string_msg_is_not_expiry() {
        assert!(!body_signals_expiry(br#"{"msg":42}"#));
    }

    #[test]
    fn test_401_signals_expiry_regardless_of_body() {
        let resp = UpstreamResponse {
            status: StatusCode::UNAUTHORIZED,
            body: Bytes::from_static(b"nope"),
        };
        assert!(resp.signals_expiry());
    }

    #[test]
    fn test_error_status_with_expiry_body_is_not_body_expiry() {
        // Body inspection only applies to 2xx; a 500 with an odd body is a
        // server error, not a session signal.
        let resp = UpstreamResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Bytes::from_static(br#"{"msg":"login again"}"#),
        };
        assert!(!resp.signals_expiry());
    }
}
