//! Protocol types for 3-D Secure 1.0 and 2.0, and the version detector.
//!
//! No single descriptor field is authoritative about the protocol version
//! across the gateway/ACS implementations this crate targets, so
//! [`detect_version`] combines several weak indicators instead of trusting
//! any one of them. That is a known-fragile heuristic, not a protocol
//! guarantee.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::challenge::ChallengeDescriptor;
use crate::util::Base64Bytes;

pub mod v1;
pub mod v2;

/// The 3-D Secure protocol version of a challenge. Versions 1.0 and 2.x are
/// supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// 3DS 1.0: `PaReq`/`PaRes` form exchange.
    V1,
    /// 3DS 2.x: `CReq`/`CRes` exchange against a StepUp endpoint.
    V2,
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolVersion::V1 => "1.0",
            ProtocolVersion::V2 => "2.0",
        };
        write!(f, "{s}")
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            ProtocolVersion::V1 => "1.0",
            ProtocolVersion::V2 => "2.0",
        })
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.starts_with('2') {
            Ok(ProtocolVersion::V2)
        } else if s.starts_with('1') {
            Ok(ProtocolVersion::V1)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported 3DS protocol version: {s}"
            )))
        }
    }
}

/// URL path markers that gateways use for 3DS 2.x challenge endpoints.
const V2_PATH_MARKERS: &[&str] = &["3ds2", "threeds2", "/v2/", "emv3ds"];

/// "Step-up" markers, the 3DS 2.0 name for the interactive challenge hop.
const STEP_UP_MARKERS: &[&str] = &["stepup", "step-up", "step_up"];

/// ACS endpoint naming patterns observed on 3DS 2.x deployments.
const V2_ACS_MARKERS: &[&str] = &["/creq", "acs/v2", "challenge/v2", "acs2"];

/// Classifies a challenge descriptor as 3DS 1.0 or 2.0.
///
/// Indicators, each worth one vote unless noted:
/// 1. the challenge URL contains a 3DS-2-style path segment;
/// 2. the challenge URL contains a step-up marker;
/// 3. the payload decodes to JSON with `messageType == "CReq"` and a
///    `messageVersion` starting with `"2."` — worth two votes, since it
///    subsumes both the message-type and message-version checks;
/// 4. the ACS URL matches a known 3DS-2 endpoint naming pattern.
///
/// Two or more votes classify as [`ProtocolVersion::V2`], anything less as
/// [`ProtocolVersion::V1`]. Payload decode errors count as "not v2" and are
/// never propagated. The classification is pure: re-running it on the same
/// descriptor always yields the same version.
pub fn detect_version(descriptor: &ChallengeDescriptor) -> ProtocolVersion {
    let challenge_url = descriptor.challenge_url.as_str().to_ascii_lowercase();
    let acs_url = descriptor
        .acs_url
        .as_ref()
        .map(|u| u.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let url_marker = V2_PATH_MARKERS.iter().any(|m| challenge_url.contains(m));
    let step_up = STEP_UP_MARKERS
        .iter()
        .any(|m| challenge_url.contains(m) || acs_url.contains(m));
    let creq_payload = descriptor
        .payload
        .as_deref()
        .map(payload_is_creq)
        .unwrap_or(false);
    let acs_marker = V2_ACS_MARKERS.iter().any(|m| acs_url.contains(m));

    let votes = u8::from(url_marker)
        + u8::from(step_up)
        + 2 * u8::from(creq_payload)
        + u8::from(acs_marker);

    let version = if votes >= 2 {
        ProtocolVersion::V2
    } else {
        ProtocolVersion::V1
    };
    tracing::debug!(
        %version,
        url_marker,
        step_up,
        creq_payload,
        acs_marker,
        "classified challenge descriptor"
    );
    version
}

/// True when the base64 payload is a JSON `CReq` with a 2.x message version.
fn payload_is_creq(payload: &str) -> bool {
    let Some(decoded) = Base64Bytes::from(payload).decode_utf8() else {
        return false;
    };
    match serde_json::from_str::<v2::ChallengeRequest>(&decoded) {
        Ok(creq) => creq.message_type == "CReq" && creq.message_version.starts_with("2."),
        Err(_) => false,
    }
}
