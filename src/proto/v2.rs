//! 3-D Secure 2.x wire types: `CReq` and `CRes`.
//!
//! The 2.x exchange is JSON carried as base64. A `CReq` names the
//! server-side transaction and the desired challenge window; the `CRes`
//! reports the final `transStatus` plus the authentication artifacts (ECI,
//! authentication value).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// A 3DS 2.x Challenge Request. Only the fields this crate inspects or
/// forwards are modeled; unknown fields pass through untouched on the wire
/// because the base64 payload is submitted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub message_type: String,
    pub message_version: String,
    #[serde(rename = "threeDSServerTransID", skip_serializing_if = "Option::is_none")]
    pub three_ds_server_trans_id: Option<String>,
    #[serde(rename = "acsTransID", skip_serializing_if = "Option::is_none")]
    pub acs_trans_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_window_size: Option<String>,
}

/// A 3DS 2.x Challenge Response, decoded from the base64 `CRes` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trans_status: Option<TransStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eci: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_value: Option<String>,
    #[serde(rename = "threeDSServerTransID", skip_serializing_if = "Option::is_none")]
    pub three_ds_server_trans_id: Option<String>,
}

/// EMVCo transaction status codes carried in `transStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransStatus {
    /// Authentication successful.
    Y,
    /// Attempted; proof of attempt generated, cardholder not fully verified.
    A,
    /// Not authenticated / denied.
    N,
    /// Authentication could not be performed.
    U,
    /// Rejected by the issuer.
    R,
    /// Challenge required; should not appear in a final `CRes`.
    C,
}

impl Display for TransStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransStatus::Y => "Y",
            TransStatus::A => "A",
            TransStatus::N => "N",
            TransStatus::U => "U",
            TransStatus::R => "R",
            TransStatus::C => "C",
        };
        write!(f, "{s}")
    }
}

/// Field name for the v2 challenge payload in form bodies.
pub const CREQ_FIELD: &str = "creq";
/// Capitalization variant some ACS deployments insist on.
pub const CREQ_FIELD_CAPITALIZED: &str = "cReq";
/// Session-correlation field accepted alongside `creq`.
pub const SESSION_DATA_FIELD: &str = "threeDSSessionData";
/// Response field carrying the base64 `CRes`.
pub const CRES_FIELD: &str = "cres";
