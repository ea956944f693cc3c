//! reqwest-backed [`AcsTransport`] for `threeds-rs`.
//!
//! The core crate never performs HTTP itself; this adapter bridges it to a
//! [`reqwest::Client`]. Build one with [`ReqwestAcsTransport::new`] or wrap
//! an existing client you already configure elsewhere:
//!
//! ```no_run
//! use threeds_reqwest::ReqwestAcsTransport;
//! use threeds_rs::flow::ThreeDsFlow;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestAcsTransport::new()?;
//! let flow = ThreeDsFlow::new(transport);
//! # let _ = flow;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use http::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use threeds_rs::builder::ContentType;
use threeds_rs::transport::{AcsTransport, RawAcsResponse, TransportError};

/// Default per-request ceiling. The flow applies its own per-candidate
/// timeout on top; this one guards against a client with no timeout at all.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// [`AcsTransport`] backed by a [`reqwest::Client`].
///
/// ACS endpoints are browser-facing: they answer HTML as often as JSON, and
/// some misreport the charset. The adapter therefore reads bodies as bytes
/// and converts lossily rather than trusting the declared encoding.
#[derive(Debug, Clone)]
pub struct ReqwestAcsTransport {
    client: reqwest::Client,
}

impl ReqwestAcsTransport {
    /// A transport with its own client and the default timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client. The caller keeps responsibility for its
    /// timeout and redirect policy.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AcsTransport for ReqwestAcsTransport {
    async fn submit(
        &self,
        url: &Url,
        content_type: ContentType,
        body: &str,
    ) -> Result<RawAcsResponse, TransportError> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, content_type.as_str())
            .header(ACCEPT, "text/html, application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(map_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_error)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        tracing::trace!(%url, status, bytes = body.len(), "ACS responded");
        Ok(RawAcsResponse { status, body })
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(error.to_string())
    }
}
