//! Challenge request builder: ordered candidate wire formats.
//!
//! The protocol is externally specified, but the ACS servers this crate
//! talks to disagree on parameter casing and encoding. The builder therefore
//! produces an ordered list of candidate bodies rather than a single trusted
//! format; the transport tries them strictly in order and stops at the first
//! 2xx. The flow logs and surfaces the format that eventually worked so
//! callers can collapse the list over time.

use serde_json::Value;
use url::form_urlencoded;

use crate::challenge::ChallengeDescriptor;
use crate::error::ThreeDsError;
use crate::proto::{ProtocolVersion, v1, v2};
use crate::util::Base64Bytes;

/// Content type of a candidate body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    UrlEncodedForm,
    Json,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::UrlEncodedForm => "application/x-www-form-urlencoded",
            ContentType::Json => "application/json",
        }
    }
}

/// Identifies which candidate format a body was built as. Carried through to
/// [`AuthenticationResult::format_used`](crate::parse::AuthenticationResult)
/// once a submission succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatLabel {
    /// v1 form: `PaReq`, `TermUrl`, `MD`.
    V1Form,
    /// v2 (a): `creq=<payload>`.
    V2Creq,
    /// v2 (b): `creq=<payload>&threeDSSessionData=<transactionId>`.
    V2CreqSessionData,
    /// v2 (c): `cReq=<payload>`, the capitalization variant.
    V2CreqCapitalized,
    /// v2 (d): raw decoded JSON payload, `application/json`.
    V2JsonDecoded,
    /// v2 (e): base64 payload as the body, `application/json`.
    V2JsonBase64,
}

impl std::fmt::Display for FormatLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormatLabel::V1Form => "v1-form",
            FormatLabel::V2Creq => "v2-creq",
            FormatLabel::V2CreqSessionData => "v2-creq-session-data",
            FormatLabel::V2CreqCapitalized => "v2-creq-capitalized",
            FormatLabel::V2JsonDecoded => "v2-json-decoded",
            FormatLabel::V2JsonBase64 => "v2-json-base64",
        };
        write!(f, "{s}")
    }
}

/// One candidate request body for ACS submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFormat {
    pub label: FormatLabel,
    pub content_type: ContentType,
    pub body: String,
}

impl ChallengeFormat {
    /// Returns a copy with an extra field merged in, used to feed user input
    /// (`otp`, `password`) into the follow-up submission.
    ///
    /// Form bodies get an appended pair. JSON object bodies get an inserted
    /// key. A JSON body that is not an object (the base64-as-body variant)
    /// is left untouched; the ACS that accepted it did not render an
    /// interactive form either.
    pub fn with_field(&self, name: &str, value: &str) -> ChallengeFormat {
        let body = match self.content_type {
            ContentType::UrlEncodedForm => {
                let pair = form_urlencoded::Serializer::new(String::new())
                    .append_pair(name, value)
                    .finish();
                if self.body.is_empty() {
                    pair
                } else {
                    format!("{}&{}", self.body, pair)
                }
            }
            ContentType::Json => match serde_json::from_str::<Value>(&self.body) {
                Ok(Value::Object(mut map)) => {
                    map.insert(name.to_string(), Value::String(value.to_string()));
                    Value::Object(map).to_string()
                }
                _ => {
                    tracing::debug!(field = name, "cannot merge field into non-object JSON body");
                    self.body.clone()
                }
            },
        };
        ChallengeFormat { body, ..*self }
    }
}

/// Builds the ordered candidate list for a descriptor and detected version.
///
/// v1 yields exactly one candidate; v2 yields five, most-likely-accepted
/// first. Requires a payload: a challenge without one cannot be submitted.
pub fn build(
    descriptor: &ChallengeDescriptor,
    version: ProtocolVersion,
) -> Result<Vec<ChallengeFormat>, ThreeDsError> {
    let payload = descriptor.payload.as_deref().ok_or_else(|| {
        ThreeDsError::Configuration("challenge descriptor carries no protocol payload".to_string())
    })?;
    match version {
        ProtocolVersion::V1 => Ok(vec![ChallengeFormat {
            label: FormatLabel::V1Form,
            content_type: ContentType::UrlEncodedForm,
            body: v1::challenge_form(descriptor, payload),
        }]),
        ProtocolVersion::V2 => Ok(v2_candidates(descriptor, payload)),
    }
}

fn v2_candidates(descriptor: &ChallengeDescriptor, payload: &str) -> Vec<ChallengeFormat> {
    let form = |field: &str| {
        form_urlencoded::Serializer::new(String::new())
            .append_pair(field, payload)
            .finish()
    };
    let with_session_data = form_urlencoded::Serializer::new(String::new())
        .append_pair(v2::CREQ_FIELD, payload)
        .append_pair(v2::SESSION_DATA_FIELD, &descriptor.transaction_id)
        .finish();
    let decoded_json = Base64Bytes::from(payload)
        .decode_utf8()
        .unwrap_or_else(|| payload.to_string());
    vec![
        ChallengeFormat {
            label: FormatLabel::V2Creq,
            content_type: ContentType::UrlEncodedForm,
            body: form(v2::CREQ_FIELD),
        },
        ChallengeFormat {
            label: FormatLabel::V2CreqSessionData,
            content_type: ContentType::UrlEncodedForm,
            body: with_session_data,
        },
        ChallengeFormat {
            label: FormatLabel::V2CreqCapitalized,
            content_type: ContentType::UrlEncodedForm,
            body: form(v2::CREQ_FIELD_CAPITALIZED),
        },
        ChallengeFormat {
            label: FormatLabel::V2JsonDecoded,
            content_type: ContentType::Json,
            body: decoded_json,
        },
        ChallengeFormat {
            label: FormatLabel::V2JsonBase64,
            content_type: ContentType::Json,
            body: payload.to_string(),
        },
    ]
}
