//! HTTP webhook transport

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use crate::errors::DeployError;
use crate::notify::dispatcher::{TransportError, TransportErrorKind, WebhookTransport};

/// Posts payloads with reqwest
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, DeployError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

/// Whether any error in the chain comes from name resolution
fn is_dns_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&dyn StdError> = err.source();
    while let Some(e) = source {
        let text = e.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
        {
            return true;
        }
        source = e.source();
    }
    false
}

/// Map a reqwest failure onto a transport error class
pub fn classify(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_dns_error(err) {
        TransportErrorKind::DnsResolution
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_status() {
        TransportErrorKind::HttpStatus
    } else {
        TransportErrorKind::Other
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, url: &str, payload: &str, timeout: Duration) -> Result<String, TransportError> {
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::new(classify(&e), e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(classify(&e), e.to_string()))?;

        // Server side failures are worth another attempt; other error statuses
        // carry the endpoint's verdict on the payload in the body.
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::new(
                TransportErrorKind::HttpStatus,
                format!("{}: {}", status, body),
            ));
        }
        Ok(body)
    }
}
