//! Error taxonomy for the authentication flow.

use std::time::Duration;

use crate::transport::TransportError;

/// Errors raised while driving a 3-D Secure authentication attempt.
///
/// These are internal to the flow: [`ThreeDsFlow::authenticate`]
/// (crate::flow::ThreeDsFlow::authenticate) folds them into a failed
/// [`AuthenticationResult`](crate::parse::AuthenticationResult) rather than
/// surfacing them to callers, keeping the outcome message the single
/// caller-visible error channel.
#[derive(Debug, thiserror::Error)]
pub enum ThreeDsError {
    /// The descriptor or flow configuration cannot support the requested
    /// operation (missing payload, missing deep-link return URL, empty
    /// candidate list).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A bounded operation exceeded its ceiling.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// Every challenge format candidate was rejected; carries the last
    /// HTTP status and body.
    #[error("ACS rejected all challenge formats, last status {status}")]
    TransportFailed { status: u16, body: String },
    /// The transport could not perform the exchange at all.
    #[error("transport error")]
    Transport(#[source] TransportError),
    /// The ACS reported a protocol-version mismatch. The flow escalates a
    /// 1.0 attempt to the 2.0 candidate list once before failing.
    #[error("ACS reported a protocol version mismatch")]
    VersionMismatch,
    /// The user cancelled an interactive prompt.
    #[error("cancelled by the user")]
    Cancelled,
    /// The browser deep-link callback was missing, malformed, or did not
    /// correlate to this attempt.
    #[error("deep-link callback error: {0}")]
    DeepLink(String),
    /// Device-data collection failed. The flow logs and swallows this.
    #[error("device data collection error: {0}")]
    DataCollection(String),
    /// An operation was invoked in a flow state that does not permit it.
    #[error("invalid flow state: {0}")]
    InvalidState(String),
}

impl From<TransportError> for ThreeDsError {
    fn from(error: TransportError) -> Self {
        ThreeDsError::Transport(error)
    }
}
