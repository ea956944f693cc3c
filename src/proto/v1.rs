//! 3-D Secure 1.0 wire names and form body construction.
//!
//! Version 1.0 is a plain form-POST exchange: the merchant submits `PaReq`,
//! `TermUrl` and `MD` to the ACS, and the ACS eventually posts a `PaRes`
//! back to the term URL.

use url::form_urlencoded;

use crate::challenge::ChallengeDescriptor;

/// Form field carrying the base64 `PaRequest` payload.
pub const PA_REQ_FIELD: &str = "PaReq";
/// Form field naming the merchant return URL.
pub const TERM_URL_FIELD: &str = "TermUrl";
/// Merchant data field, echoed back by the ACS.
pub const MD_FIELD: &str = "MD";
/// Response field carrying the base64 `PaRes` payload.
pub const PA_RES_FIELD: &str = "PaRes";

/// ECI assigned to a fully authenticated v1 exchange.
pub const ECI_AUTHENTICATED: &str = "05";
/// ECI assigned to an attempted (frictionless) exchange.
pub const ECI_ATTEMPTED: &str = "06";

/// Builds the single v1 challenge form body: `PaReq`, `TermUrl`, `MD`.
///
/// When the descriptor carries no `MD`, the transaction id stands in for it
/// so the ACS echo still correlates with the attempt.
pub fn challenge_form(descriptor: &ChallengeDescriptor, payload: &str) -> String {
    let term_url = descriptor
        .term_url
        .as_ref()
        .map(|u| u.to_string())
        .unwrap_or_default();
    let md = descriptor
        .md
        .clone()
        .unwrap_or_else(|| descriptor.transaction_id.clone());
    form_urlencoded::Serializer::new(String::new())
        .append_pair(PA_REQ_FIELD, payload)
        .append_pair(TERM_URL_FIELD, &term_url)
        .append_pair(MD_FIELD, &md)
        .finish()
}
