//! Browser-redirect transport: challenge URL construction and the deep-link
//! callback contract.
//!
//! On hosts that cannot POST to the ACS from within the app process, the
//! challenge runs in the system browser. The flow builds a challenge URL
//! carrying the protocol payload plus a deep-link return URL, opens it via
//! the injected [`UrlOpener`], and suspends until the app's deep-link
//! handler delivers the callback URL. The wait is unbounded here by design;
//! the application imposes its own ceiling, since this crate cannot force a
//! browser to close.

use url::Url;

use crate::challenge::ChallengeDescriptor;
use crate::error::ThreeDsError;
use crate::parse::{AuthenticationResult, AuthenticationStatus, result_from_cres, result_from_pares};
use crate::proto::{ProtocolVersion, v1, v2};
use crate::timestamp::UnixTimestamp;

/// Opens a URL in the system browser (or equivalent host facility).
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &Url) -> Result<(), ThreeDsError>;
}

/// Builds the browser challenge URL: the submission endpoint with the
/// protocol payload and a deep-link return URL carrying `transactionId` and
/// `timestamp`.
pub fn build_redirect_url(
    descriptor: &ChallengeDescriptor,
    version: ProtocolVersion,
    return_url: &Url,
) -> Result<Url, ThreeDsError> {
    let payload = descriptor.payload.as_deref().ok_or_else(|| {
        ThreeDsError::Configuration("challenge descriptor carries no protocol payload".to_string())
    })?;

    let mut return_link = return_url.clone();
    return_link
        .query_pairs_mut()
        .append_pair("transactionId", &descriptor.transaction_id)
        .append_pair("timestamp", &UnixTimestamp::now().to_string());

    let mut challenge = descriptor.submission_url().clone();
    {
        let mut pairs = challenge.query_pairs_mut();
        match version {
            ProtocolVersion::V1 => {
                pairs.append_pair(v1::PA_REQ_FIELD, payload);
                if let Some(term_url) = &descriptor.term_url {
                    pairs.append_pair(v1::TERM_URL_FIELD, term_url.as_str());
                }
                let md = descriptor
                    .md
                    .clone()
                    .unwrap_or_else(|| descriptor.transaction_id.clone());
                pairs.append_pair(v1::MD_FIELD, &md);
            }
            ProtocolVersion::V2 => {
                pairs.append_pair(v2::CREQ_FIELD, payload);
                pairs.append_pair(v2::SESSION_DATA_FIELD, &descriptor.transaction_id);
            }
        }
        pairs.append_pair("returnUrl", return_link.as_str());
    }
    Ok(challenge)
}

/// The deep-link callback delivered when the browser hands control back.
///
/// Contract: query parameters `transactionId` (mandatory), `PaRes` or
/// `cres`, and `status`. A missing `transactionId` is a fatal parse error —
/// without it the callback cannot be correlated to an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkCallback {
    pub transaction_id: String,
    pub pa_res: Option<String>,
    pub cres: Option<String>,
    pub status: Option<String>,
}

impl DeepLinkCallback {
    pub fn parse(url: &Url) -> Result<Self, ThreeDsError> {
        let mut transaction_id = None;
        let mut pa_res = None;
        let mut cres = None;
        let mut status = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "transactionId" => transaction_id = Some(value.into_owned()),
                "PaRes" => pa_res = Some(value.into_owned()),
                "cres" => cres = Some(value.into_owned()),
                "status" => status = Some(value.into_owned()),
                _ => {}
            }
        }
        let transaction_id = transaction_id.ok_or_else(|| {
            ThreeDsError::DeepLink("callback is missing transactionId".to_string())
        })?;
        Ok(Self {
            transaction_id,
            pa_res,
            cres,
            status,
        })
    }

    /// Normalizes the callback parameters into the final result, reusing the
    /// same `PaRes`/`CRes` mapping the direct-POST parser applies.
    pub fn into_result(self) -> AuthenticationResult {
        if let Some(pa_res) = self.pa_res {
            return result_from_pares(pa_res);
        }
        if let Some(cres) = self.cres {
            return result_from_cres(&cres);
        }
        match self.status.as_deref() {
            Some("Y") => AuthenticationResult::authenticated(
                AuthenticationStatus::Authenticated,
                v1::ECI_AUTHENTICATED,
                None,
                None,
            ),
            Some("A") => AuthenticationResult::authenticated(
                AuthenticationStatus::Attempted,
                v1::ECI_ATTEMPTED,
                None,
                None,
            ),
            _ => AuthenticationResult::failure(
                "authentication failed: browser callback carried no result",
            ),
        }
    }
}
