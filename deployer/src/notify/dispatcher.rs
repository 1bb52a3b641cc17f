//! Notification delivery with bounded retry

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::errors::DeployError;
use crate::notify::message::Message;

/// Acknowledgement body of a successful post
pub const ACK_BODY: &str = "ok";

/// Per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Class of a failed post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Timeout,
    DnsResolution,
    Connect,
    /// The endpoint answered with an error status
    HttpStatus,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "operation timed out",
            TransportErrorKind::DnsResolution => "couldn't resolve host",
            TransportErrorKind::Connect => "couldn't connect to server",
            TransportErrorKind::HttpStatus => "HTTP response code said error",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(s)
    }
}

/// A post that did not reach the endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Delivers a serialized payload to a webhook
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `payload` as JSON and return the response body
    async fn post(&self, url: &str, payload: &str, timeout: Duration) -> Result<String, TransportError>;
}

/// Retry policy for notification delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Fixed pause between attempts
    pub interval: Duration,

    /// Failures worth retrying
    pub transient: HashSet<TransportErrorKind>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Default::default()
        }
    }

    pub fn is_transient(&self, kind: TransportErrorKind) -> bool {
        self.transient.contains(&kind)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(3),
            transient: HashSet::from([
                TransportErrorKind::Timeout,
                TransportErrorKind::DnsResolution,
                TransportErrorKind::Connect,
                TransportErrorKind::HttpStatus,
            ]),
        }
    }
}

/// What happened to a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The endpoint acknowledged the message
    Delivered { attempts: u32 },

    /// The endpoint answered with something other than the acknowledgement
    Rejected { body: String },

    /// Every permitted attempt failed, or the failure was not transient
    GaveUp { attempts: u32, error: TransportError },

    /// The message could not be serialized
    NotSent { reason: String },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }
}

/// Sends notification messages; failures are logged, never returned
pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Post `message` to `url`, retrying transient failures per `policy`
    pub async fn send(&self, message: &Message, url: &str, policy: &RetryPolicy) -> Delivery {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                let err = DeployError::NotificationDeliveryFailed(e.to_string());
                error!("{}", err);
                return Delivery::NotSent {
                    reason: e.to_string(),
                };
            }
        };

        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.post(url, &payload, self.timeout).await {
                Ok(body) if body == ACK_BODY => {
                    debug!("Notification delivered after {} attempt(s)", attempt);
                    return Delivery::Delivered { attempts: attempt };
                }
                Ok(body) => {
                    error!("Notification endpoint reported: '{}'", body);
                    return Delivery::Rejected { body };
                }
                Err(e) if policy.is_transient(e.kind) && attempt < max_attempts => {
                    warn!(
                        "Notification post failed ({}) - retrying in {} seconds ({}/{})",
                        e,
                        policy.interval.as_secs(),
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(policy.interval).await;
                    attempt += 1;
                }
                Err(e) => {
                    let err = DeployError::NotificationDeliveryFailed(e.to_string());
                    error!("{} - Giving up.", err);
                    return Delivery::GaveUp {
                        attempts: attempt,
                        error: e,
                    };
                }
            }
        }
    }
}
