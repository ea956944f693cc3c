//! The challenge descriptor: input to a single authentication attempt.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ThreeDsError;
use crate::proto::ProtocolVersion;
use crate::util::Base64Bytes;

/// Everything the payment-initialization response says about a pending
/// challenge. Created by the payment collaborator, consumed exactly once per
/// authentication attempt, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDescriptor {
    /// The challenge endpoint the exchange starts against.
    pub challenge_url: Url,
    /// ACS endpoint when it differs from the challenge URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acs_url: Option<Url>,
    /// Gateway token or JWT authorizing the exchange.
    pub token: String,
    /// Base64-encoded protocol payload: `PaRequest` for 1.0, `CReq` for 2.x.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Merchant term/return URL posted back to by the ACS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_url: Option<Url>,
    /// Opaque merchant data (`MD`), echoed by the ACS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md: Option<String>,
    /// Transaction identifier of the payment attempt.
    pub transaction_id: String,
    /// Declared challenge-window size, e.g. `"05"` for full screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_window_size: Option<String>,
    /// Version declared by the gateway. A hint only; never trusted on its
    /// own, see [`detect_version`](crate::proto::detect_version).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_hint: Option<ProtocolVersion>,
}

impl ChallengeDescriptor {
    /// Checks the descriptor invariants: non-empty token, and a payload that
    /// is valid base64 when present. An empty challenge URL cannot be
    /// represented, `url::Url` rejects it at parse time.
    pub fn validate(&self) -> Result<(), ThreeDsError> {
        if self.token.trim().is_empty() {
            return Err(ThreeDsError::Configuration(
                "challenge descriptor is missing the gateway token".to_string(),
            ));
        }
        if let Some(payload) = &self.payload
            && Base64Bytes::from(payload.as_str()).decode().is_err()
        {
            return Err(ThreeDsError::Configuration(
                "challenge payload is not valid base64".to_string(),
            ));
        }
        Ok(())
    }

    /// The endpoint challenge submissions go to: the ACS URL when one is
    /// declared, otherwise the challenge URL.
    pub fn submission_url(&self) -> &Url {
        self.acs_url.as_ref().unwrap_or(&self.challenge_url)
    }
}
