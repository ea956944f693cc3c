//! Response parser: normalizes heterogeneous ACS responses into an
//! [`AuthenticationResult`].
//!
//! ACS implementations answer with HTML form pages, JSON bodies, or bare
//! redirect shells. The parser runs a fixed sequence of checks, first match
//! wins; the final fallback treats an unrecognized non-error response as a
//! frictionless "attempted" success. That last branch mirrors observed
//! gateway behavior and is flagged for product/security review — it may mask
//! ACS errors that match no known substring — so it is kept explicit and
//! logged distinctly rather than silently tightened.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fmt::Display;

use crate::builder::FormatLabel;
use crate::error::ThreeDsError;
use crate::proto::v1;
use crate::proto::v2::{CRES_FIELD, ChallengeResponse, TransStatus};
use crate::util::Base64Bytes;

/// Authentication status code as card networks report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationStatus {
    /// `Y` — fully authenticated.
    #[serde(rename = "Y")]
    Authenticated,
    /// `A` — attempted; proof generated, cardholder not fully verified.
    #[serde(rename = "A")]
    Attempted,
    /// `N` — not authenticated.
    #[serde(rename = "N")]
    Failed,
}

impl AuthenticationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationStatus::Authenticated => "Y",
            AuthenticationStatus::Attempted => "A",
            AuthenticationStatus::Failed => "N",
        }
    }
}

impl Display for AuthenticationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a whole authentication attempt. Produced once, never mutated.
///
/// Invariants, upheld by the constructors: `success == true` implies status
/// `Y` or `A` with an ECI present; `success == false` implies an error
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub success: bool,
    pub status: AuthenticationStatus,
    pub eci: Option<String>,
    /// CAVV / authentication value, when the ACS supplied one.
    pub cavv: Option<String>,
    /// Raw protocol response (`PaRes` or `CRes`) as received.
    pub raw_response: Option<String>,
    pub error: Option<String>,
    /// The challenge format the ACS eventually accepted, so callers can
    /// collapse the candidate list over time.
    pub format_used: Option<FormatLabel>,
}

impl AuthenticationResult {
    /// A successful outcome. `status` must be `Y` or `A`.
    pub fn authenticated(
        status: AuthenticationStatus,
        eci: impl Into<String>,
        cavv: Option<String>,
        raw_response: Option<String>,
    ) -> Self {
        debug_assert!(status != AuthenticationStatus::Failed);
        Self {
            success: true,
            status,
            eci: Some(eci.into()),
            cavv,
            raw_response,
            error: None,
            format_used: None,
        }
    }

    /// A failed outcome with a caller-visible message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: AuthenticationStatus::Failed,
            eci: None,
            cavv: None,
            raw_response: None,
            error: Some(message.into()),
            format_used: None,
        }
    }

    pub fn with_format(mut self, format: FormatLabel) -> Self {
        self.format_used = Some(format);
        self
    }
}

/// Version-mismatch markers: the ACS telling us a 3DS 1.0 form was posted to
/// a 3DS 2.0 endpoint (or the reverse). Only meaningful next to an
/// "integration error" banner.
const MISMATCH_MARKERS: &[&str] = &["3ds 2.0 endpoint", "3ds 1.0 form post"];

const ERROR_MARKERS: &[&str] = &[
    "authentication failed",
    "error",
    "failed",
    "failure",
    "invalid",
    "declined",
];

const CONTINUE_MARKERS: &[&str] = &["continue", "next", "submit"];

static PARES_NAME_FIRST: Lazy<Regex> = Lazy::new(|| hidden_input_name_first(v1::PA_RES_FIELD));
static PARES_VALUE_FIRST: Lazy<Regex> = Lazy::new(|| hidden_input_value_first(v1::PA_RES_FIELD));
static CRES_NAME_FIRST: Lazy<Regex> = Lazy::new(|| hidden_input_name_first(CRES_FIELD));
static CRES_VALUE_FIRST: Lazy<Regex> = Lazy::new(|| hidden_input_value_first(CRES_FIELD));

/// Case-insensitive hidden-input match for a protocol field, `name` before
/// `value`. The field names contain no regex metacharacters.
fn hidden_input_name_first(field: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)name\s*=\s*["']?{field}["']?[^>]*?value\s*=\s*["']([^"']+)["']"#
    ))
    .unwrap()
}

/// Same match with the attributes in the opposite order.
fn hidden_input_value_first(field: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)value\s*=\s*["']([^"']+)["'][^>]*?name\s*=\s*["']?{field}["']?"#
    ))
    .unwrap()
}

/// Parses a raw ACS response body into an [`AuthenticationResult`].
///
/// Ordered checks, first match wins:
/// 1. version-mismatch marker → [`ThreeDsError::VersionMismatch`], so the
///    flow can escalate to the v2 candidate list;
/// 2. `PaRes` hidden/JSON field → success, `Y`, ECI `05`;
/// 3. `CRes`/`cres` field → decode and map `transStatus`; a present but
///    undecodable field defaults to `A`/`05`;
/// 4. explicit error substrings → failure;
/// 5. continue/next/submit with no resolved field → failure, additional
///    steps are out of scope;
/// 6. nothing recognized → frictionless success `A`/`06`, logged at `warn`.
pub fn parse(body: &str) -> Result<AuthenticationResult, ThreeDsError> {
    let lower = body.to_ascii_lowercase();

    let mismatch = lower.contains("version mismatch")
        || (lower.contains("integration error")
            && MISMATCH_MARKERS.iter().any(|m| lower.contains(m)));
    if mismatch {
        return Err(ThreeDsError::VersionMismatch);
    }

    if let Some(pa_res) = extract_field(body, &PARES_NAME_FIRST, &PARES_VALUE_FIRST, v1::PA_RES_FIELD)
    {
        return Ok(result_from_pares(pa_res));
    }

    if let Some(cres) = extract_field(body, &CRES_NAME_FIRST, &CRES_VALUE_FIRST, CRES_FIELD) {
        return Ok(result_from_cres(&cres));
    }

    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        return Ok(AuthenticationResult::failure(
            "authentication failed: ACS reported an error",
        ));
    }

    if CONTINUE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Ok(AuthenticationResult::failure(
            "additional authentication steps are not supported",
        ));
    }

    tracing::warn!("ambiguous ACS response treated as frictionless success (A/06)");
    Ok(AuthenticationResult::authenticated(
        AuthenticationStatus::Attempted,
        v1::ECI_ATTEMPTED,
        None,
        None,
    ))
}

/// A v1 `PaRes` counts as full authentication.
pub(crate) fn result_from_pares(pa_res: String) -> AuthenticationResult {
    AuthenticationResult::authenticated(
        AuthenticationStatus::Authenticated,
        v1::ECI_AUTHENTICATED,
        None,
        Some(pa_res),
    )
}

/// Maps a base64 `CRes` onto the result. Decode failures with the field
/// present default to `A`/`05` — the ACS answered, we just could not read
/// the details.
pub(crate) fn result_from_cres(cres_b64: &str) -> AuthenticationResult {
    let decoded = Base64Bytes::from(cres_b64)
        .decode_utf8()
        .and_then(|json| serde_json::from_str::<ChallengeResponse>(&json).ok());
    let Some(cres) = decoded else {
        tracing::debug!("CRes field present but not decodable, defaulting to A/05");
        return AuthenticationResult::authenticated(
            AuthenticationStatus::Attempted,
            v1::ECI_AUTHENTICATED,
            None,
            Some(cres_b64.to_string()),
        );
    };
    match cres.trans_status {
        Some(TransStatus::Y) => AuthenticationResult::authenticated(
            AuthenticationStatus::Authenticated,
            cres.eci.unwrap_or_else(|| v1::ECI_AUTHENTICATED.to_string()),
            cres.authentication_value,
            Some(cres_b64.to_string()),
        ),
        Some(TransStatus::A) => AuthenticationResult::authenticated(
            AuthenticationStatus::Attempted,
            cres.eci.unwrap_or_else(|| v1::ECI_ATTEMPTED.to_string()),
            cres.authentication_value,
            Some(cres_b64.to_string()),
        ),
        Some(TransStatus::C) => {
            AuthenticationResult::failure("additional authentication steps are not supported")
        }
        Some(status @ (TransStatus::N | TransStatus::U | TransStatus::R)) => {
            AuthenticationResult::failure(format!(
                "authentication failed: transStatus={status}"
            ))
        }
        None => AuthenticationResult::authenticated(
            AuthenticationStatus::Attempted,
            cres.eci.unwrap_or_else(|| v1::ECI_AUTHENTICATED.to_string()),
            cres.authentication_value,
            Some(cres_b64.to_string()),
        ),
    }
}

/// Pulls a protocol field out of the body: hidden form inputs in either
/// attribute order, then a top-level JSON field in common casings.
fn extract_field(
    body: &str,
    name_first: &Regex,
    value_first: &Regex,
    json_key: &str,
) -> Option<String> {
    if let Some(captures) = name_first.captures(body) {
        return Some(captures[1].to_string());
    }
    if let Some(captures) = value_first.captures(body) {
        return Some(captures[1].to_string());
    }
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let object = value.as_object()?;
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(json_key))
        .and_then(|(_, v)| v.as_str())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cres_b64(json: Value) -> String {
        Base64Bytes::encode(json.to_string()).to_string()
    }

    #[test]
    fn hidden_pares_field_is_full_authentication() {
        let body = r#"<form><input type="hidden" name="PaRes" value="abc123"/></form>"#;
        let result = parse(body).unwrap();
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);
        assert_eq!(result.eci.as_deref(), Some("05"));
        assert_eq!(result.raw_response.as_deref(), Some("abc123"));
    }

    #[test]
    fn json_pares_field_is_recognized() {
        let result = parse(r#"{"PaRes": "xyz"}"#).unwrap();
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);
    }

    #[test]
    fn version_mismatch_marker_is_its_own_error() {
        let body = "Integration Error: 3DS 1.0 Form POST to a 3DS 2.0 Endpoint";
        assert!(matches!(parse(body), Err(ThreeDsError::VersionMismatch)));
    }

    #[test]
    fn decodable_cres_maps_trans_status() {
        let cres = cres_b64(serde_json::json!({"transStatus": "Y", "eci": "05"}));
        let body = format!(r#"<input name="cres" value="{cres}">"#);
        let result = parse(&body).unwrap();
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);
        assert_eq!(result.eci.as_deref(), Some("05"));
    }

    #[test]
    fn cres_with_failed_trans_status_is_a_failure() {
        let cres = cres_b64(serde_json::json!({"transStatus": "N"}));
        let result = parse(&format!(r#"{{"cres": "{cres}"}}"#)).unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("transStatus=N"));
    }

    #[test]
    fn undecodable_cres_defaults_to_attempted() {
        let body = r#"<input name="cres" value="not-base64-at-all!">"#;
        let result = parse(body).unwrap();
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Attempted);
        assert_eq!(result.eci.as_deref(), Some("05"));
    }

    #[test]
    fn error_substrings_fail() {
        let result = parse("<html>Authentication failed, card declined</html>").unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("failed"));
    }

    #[test]
    fn continue_page_is_an_explicit_scope_boundary() {
        let result = parse("<html><button>Submit</button> to continue</html>").unwrap();
        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .unwrap()
                .contains("additional authentication steps")
        );
    }

    #[test]
    fn unrecognized_response_is_frictionless_attempted() {
        let result = parse("<html><body>Thank you</body></html>").unwrap();
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Attempted);
        assert_eq!(result.eci.as_deref(), Some("06"));
    }

    #[test]
    fn value_before_name_attribute_order_is_handled() {
        let body = r#"<input value="zz99" type="hidden" name="PaRes">"#;
        let result = parse(body).unwrap();
        assert_eq!(result.raw_response.as_deref(), Some("zz99"));
    }
}
