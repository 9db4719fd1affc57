//! Remote prediction client for the MindsDB predict endpoint.
//!
//! Exposes a single `ask(model, prompt) -> String` interface. All wire types
//! are private to this module — callers never see them. The client performs
//! exactly one round-trip per call: no retry, no backoff, no cancellation.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Token budget handed to [`query_message`]. Unused by it today.
pub const TOKEN_BUDGET: i64 = 4096 - 500;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("predict request failed: {0}")]
    Request(String),

    #[error("prediction response contained no rows")]
    EmptyPrediction,
}

// ── Public client ─────────────────────────────────────────────────────────────

/// Adapter for the MindsDB cloud predict API.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally. Authentication is cookie-only:
/// the session cookie is sent verbatim on every request.
#[derive(Debug, Clone)]
pub struct PredictClient {
    client: Client,
    base_url: String,
    session_cookie: String,
}

impl PredictClient {
    /// Build a client from config values.
    ///
    /// `timeout_seconds` is applied only when present — with `None` the call
    /// can block until the remote end hangs up.
    pub fn new(
        base_url: String,
        session_cookie: String,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, RemoteError> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RemoteError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url, session_cookie })
    }

    /// Send `prompt` to `model` and return the predicted text.
    ///
    /// A `None` prompt is forwarded as JSON `null` — the boundary does not
    /// reject it; the remote end decides what to do with it.
    pub async fn ask(&self, model: &str, prompt: Option<&str>) -> Result<String, RemoteError> {
        let message = prompt.map(|p| query_message(p, TOKEN_BUDGET));

        let url = format!(
            "{}/api/projects/mindsdb/models/{model}/predict",
            self.base_url
        );
        let payload = PredictRequest {
            data: vec![PredictInput { text: message }],
        };

        debug!(
            %model,
            prompt_len = message.map(str::len).unwrap_or(0),
            "sending predict request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full predict request payload");
        }

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::COOKIE,
                format!("session={}", self.session_cookie),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "predict HTTP request failed (transport)");
                RemoteError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let rows = response.json::<Vec<PredictRow>>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize predict response");
            RemoteError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(rows = rows.len(), "received predict response");

        rows.into_iter()
            .next()
            .map(|row| row.response)
            .ok_or(RemoteError::EmptyPrediction)
    }
}

/// Shape `query` to fit `_token_budget` before it is sent.
///
/// Pass-through today: the budget is unused and the input is returned
/// unchanged, for any budget value.
pub fn query_message(query: &str, _token_budget: i64) -> &str {
    query
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    data: Vec<PredictInput<'a>>,
}

#[derive(Debug, Serialize)]
struct PredictInput<'a> {
    // `None` must serialize as `null`, not be skipped.
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PredictRow {
    response: String,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    error!(%status, "predict request returned HTTP error");
    Err(RemoteError::Request(format!("HTTP {status}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_message_is_pass_through() {
        assert_eq!(query_message("hello", TOKEN_BUDGET), "hello");
        assert_eq!(query_message("hello", 0), "hello");
        assert_eq!(query_message("hello", -42), "hello");
        assert_eq!(query_message("", 9999), "");
    }

    #[test]
    fn missing_prompt_serializes_as_null() {
        let payload = PredictRequest { data: vec![PredictInput { text: None }] };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"data":[{"text":null}]}"#
        );
    }

    #[test]
    fn prompt_serializes_as_text_field() {
        let payload = PredictRequest { data: vec![PredictInput { text: Some("hi") }] };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"data":[{"text":"hi"}]}"#
        );
    }

    #[test]
    fn prediction_rows_parse() {
        let rows: Vec<PredictRow> =
            serde_json::from_str(r#"[{"response": "hello", "extra": 1}]"#).unwrap();
        assert_eq!(rows[0].response, "hello");
    }

    #[test]
    fn missing_response_field_fails_to_parse() {
        let result = serde_json::from_str::<Vec<PredictRow>>(r#"[{"answer": "hello"}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn client_builds_without_timeout() {
        assert!(PredictClient::new("http://localhost:0".into(), "c".into(), None).is_ok());
    }
}
