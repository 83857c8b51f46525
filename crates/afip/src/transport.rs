//! SOAP transport.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failure. The remote outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established or was reset.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unexpected HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
}

/// Posts SOAP envelopes.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Posts `envelope` to `endpoint` with the given SOAPAction and returns
    /// the response body.
    ///
    /// SOAP faults arrive with HTTP 500 and are returned as bodies.
    async fn call(
        &self,
        endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<String, TransportError>;
}

const MAX_ERROR_BODY: usize = 512;

/// HTTPS transport on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn call(
        &self,
        endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{action}\""))
            .body(envelope)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest)?;

        match status {
            200 | 500 => Ok(body),
            _ => {
                let mut body = body;
                if body.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| body.is_char_boundary(*i))
                        .unwrap_or(0);
                    body.truncate(cut);
                }
                Err(TransportError::Status { status, body })
            }
        }
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}
