//! Delivery of payloads to live web socket connections
//!
//! The gateway exposes a management API where a `POST` to
//! `{endpoint}/@connections/{connection_id}` pushes the request body down the
//! socket. A connection that has already closed answers `410 Gone`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};

use crate::error::DeliveryError;
use crate::resilience::timeout::PUSH_REQUEST_TIMEOUT;

/// Everything except RFC 3986 unreserved characters.
const CONNECTION_ID_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Pushes one payload to one connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn post_to_connection(
        &self,
        connection_id: &str,
        payload: Bytes,
    ) -> Result<(), DeliveryError>;
}

/// `PushChannel` backed by the gateway's HTTP management API.
#[derive(Clone)]
pub struct HttpPushChannel {
    client: Client,
    endpoint: String,
}

impl HttpPushChannel {
    pub fn new(endpoint: &str) -> Result<Self, DeliveryError> {
        Self::with_timeout(endpoint, PUSH_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!(
            "{}/@connections/{}",
            self.endpoint,
            utf8_percent_encode(connection_id, CONNECTION_ID_ENCODE_SET)
        )
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn post_to_connection(
        &self,
        connection_id: &str,
        payload: Bytes,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GONE {
            return Err(DeliveryError::Gone);
        }
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
        })
    }
}
