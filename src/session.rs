//! Inbound interface: extracting 3DS descriptors from the
//! payment-initialization response.
//!
//! The gateway reports collection and challenge parameters in two shapes:
//! the current one, nested under `methods[].threeDSInfo`, and a legacy one
//! with top-level `threeDSUrl`/`challengeUrl` fields. Extraction is lenient:
//! a shape that does not apply simply yields `None`, the same
//! try-modern-then-legacy chain used for response parsing.

use serde::Deserialize;
use url::Url;

use crate::challenge::ChallengeDescriptor;
use crate::collect::DataCollectionDescriptor;

/// The slice of the payment-initialization response this crate consumes.
/// Unknown fields are ignored; everything here is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResponse {
    pub device_data_collection_url: Option<String>,
    pub access_token: Option<String>,
    pub reference_id: Option<String>,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub methods: Vec<PaymentMethodEntry>,
    /// Legacy top-level challenge endpoint.
    #[serde(rename = "threeDSUrl")]
    pub three_ds_url: Option<String>,
    /// Legacy alias for the same endpoint.
    pub challenge_url: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "paRequest")]
    pub pa_request: Option<String>,
    pub md: Option<String>,
    pub term_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentMethodEntry {
    #[serde(rename = "threeDSInfo")]
    pub three_ds_info: Option<ThreeDsInfo>,
}

/// Challenge parameters as nested under `methods[].threeDSInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDsInfo {
    pub url: String,
    pub token: String,
    #[serde(rename = "paRequest")]
    pub pa_request: Option<String>,
    pub md: Option<String>,
    pub term_url: Option<String>,
}

impl PaymentInitResponse {
    /// Builds the data-collection descriptor when the response carries the
    /// collection triple. Malformed URLs yield `None` with a warning; a
    /// broken collection hint must not fail the payment.
    pub fn data_collection(&self) -> Option<DataCollectionDescriptor> {
        let url = self.device_data_collection_url.as_deref()?;
        let access_token = self.access_token.clone()?;
        let reference_id = self.reference_id.clone()?;
        let collection_url = parse_url(url, "deviceDataCollectionUrl")?;
        Some(DataCollectionDescriptor {
            collection_url,
            access_token,
            reference_id,
            transaction_id: self.correlation_id(),
        })
    }

    /// Builds the challenge descriptor: `methods[].threeDSInfo` first, then
    /// the legacy top-level fields. `None` means no challenge is required.
    pub fn challenge(&self) -> Option<ChallengeDescriptor> {
        if let Some(info) = self
            .methods
            .iter()
            .find_map(|entry| entry.three_ds_info.as_ref())
        {
            return self.descriptor_from(
                &info.url,
                &info.token,
                info.pa_request.as_deref(),
                info.md.as_deref(),
                info.term_url.as_deref(),
            );
        }
        let url = self.three_ds_url.as_deref().or(self.challenge_url.as_deref())?;
        let token = self.token.as_deref()?;
        self.descriptor_from(
            url,
            token,
            self.pa_request.as_deref(),
            self.md.as_deref(),
            self.term_url.as_deref(),
        )
    }

    fn descriptor_from(
        &self,
        url: &str,
        token: &str,
        pa_request: Option<&str>,
        md: Option<&str>,
        term_url: Option<&str>,
    ) -> Option<ChallengeDescriptor> {
        let challenge_url = parse_url(url, "challenge url")?;
        let term_url = term_url.and_then(|u| parse_url(u, "termUrl"));
        Some(ChallengeDescriptor {
            challenge_url,
            acs_url: None,
            token: token.to_string(),
            payload: pa_request.map(ToOwned::to_owned),
            term_url,
            md: md.map(ToOwned::to_owned),
            transaction_id: self.correlation_id(),
            challenge_window_size: None,
            version_hint: None,
        })
    }

    /// Best available correlation id for the attempt.
    fn correlation_id(&self) -> String {
        self.transaction_id
            .clone()
            .or_else(|| self.reference_id.clone())
            .or_else(|| self.md.clone())
            .unwrap_or_default()
    }
}

fn parse_url(raw: &str, field: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(error) => {
            tracing::warn!(field, %error, "ignoring malformed URL in payment-init response");
            None
        }
    }
}
