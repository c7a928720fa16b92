use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::types::{value_to_i64, ChannelError, TransportError};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:60.0) Gecko/20100101 Firefox/60.0";
const WEB_ORIGIN: &str = "https://www.facebook.com";

/// Anti-hijacking guard the backend prepends to every JSON payload.
const PAYLOAD_GUARD: &str = "for (;;);";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `TransportResponse` used across Pulse components.
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
/// Trait contract for `Transport` behavior.
///
/// The seam between the poll loop and the network. Deployments that carry
/// authenticated cookies wrap their own client behind this trait; tests
/// substitute a scripted fake.
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;

    async fn post(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
/// `reqwest`-backed transport with per-call timeouts.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(REFERER, HeaderValue::from_static(WEB_ORIGIN));
        headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| TransportError::Other {
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client, typically one already carrying session
    /// cookies from the authentication flow.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<TransportResponse, TransportError> {
        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        debug!(url, params = params.len(), "transport get");
        self.execute(self.client.get(url).query(params).timeout(timeout))
            .await
    }

    async fn post(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        debug!(url, params = params.len(), "transport post");
        self.execute(self.client.post(url).form(params).timeout(timeout))
            .await
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connectivity {
            message: error.to_string(),
        }
    } else {
        TransportError::Other {
            message: error.to_string(),
        }
    }
}

/// Strips the payload guard, parses the body, and surfaces payload-level
/// backend errors as `ChannelError::Api`.
pub fn parse_payload(body: &str) -> Result<Value, ChannelError> {
    let trimmed = body.trim();
    let json_text = trimmed.strip_prefix(PAYLOAD_GUARD).unwrap_or(trimmed).trim();
    let payload: Value = serde_json::from_str(json_text)?;
    if let Some(code) = payload.get("error").and_then(value_to_i64) {
        let summary = payload
            .get("errorSummary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(ChannelError::Api { code, summary });
    }
    Ok(payload)
}

/// GETs `url` and returns the decoded payload, mapping non-success statuses to
/// `ChannelError::HttpStatus`.
pub(crate) async fn get_payload(
    transport: &dyn Transport,
    url: &str,
    params: &[(String, String)],
    timeout: Duration,
) -> Result<Value, ChannelError> {
    let response = transport.get(url, params, timeout).await?;
    if !response.is_success() {
        return Err(ChannelError::HttpStatus {
            status: response.status,
            body: response.body,
        });
    }
    parse_payload(&response.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_payload_strips_the_guard_prefix() {
        let payload = parse_payload("for (;;);{\"seq\":\"7\"}").expect("payload");
        assert_eq!(payload["seq"], "7");
    }

    #[test]
    fn parse_payload_accepts_unguarded_bodies() {
        let payload = parse_payload("{\"t\":\"heartbeat\"}").expect("payload");
        assert_eq!(payload["t"], "heartbeat");
    }

    #[test]
    fn parse_payload_surfaces_backend_error_codes() {
        let error = parse_payload(
            "for (;;);{\"error\":1357004,\"errorSummary\":\"Sorry, something went wrong\"}",
        )
        .expect_err("backend error");
        match error {
            ChannelError::Api { code, summary } => {
                assert_eq!(code, 1_357_004);
                assert_eq!(summary, "Sorry, something went wrong");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_payload_rejects_non_json_bodies() {
        let error = parse_payload("<html>Bad Gateway</html>").expect_err("parse failure");
        assert!(matches!(error, ChannelError::Serde(_)));
    }
}
