//! The ACS transport seam and the ordered candidate probe.
//!
//! The core never talks HTTP itself. Implementations of [`AcsTransport`]
//! (see the `threeds-reqwest` crate for the reqwest-backed one) perform the
//! actual POST; [`probe_formats`] drives them over the builder's candidate
//! list, strictly in order and never concurrently — an ACS may treat a
//! duplicate submission as a replay attempt.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use url::Url;

use crate::builder::{ChallengeFormat, ContentType};
use crate::error::ThreeDsError;

/// Errors raised by an [`AcsTransport`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request could not be performed (connection refused, DNS
    /// failure, TLS error).
    #[error("HTTP request failed: {0}")]
    Http(String),
    /// The per-request timeout elapsed before the ACS answered.
    #[error("request timed out")]
    Timeout,
}

/// Raw response from an ACS or StepUp endpoint: HTML, JSON, or a form page.
/// Interpretation is the parser's job.
#[derive(Debug, Clone)]
pub struct RawAcsResponse {
    pub status: u16,
    pub body: String,
}

impl RawAcsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Asynchronous submission to an ACS or collection endpoint.
#[async_trait::async_trait]
pub trait AcsTransport: Send + Sync {
    /// POST `body` to `url` with the given content type. Must respect
    /// cancellation: dropping the returned future aborts the in-flight
    /// request.
    async fn submit(
        &self,
        url: &Url,
        content_type: ContentType,
        body: &str,
    ) -> Result<RawAcsResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T: AcsTransport> AcsTransport for Arc<T> {
    async fn submit(
        &self,
        url: &Url,
        content_type: ContentType,
        body: &str,
    ) -> Result<RawAcsResponse, TransportError> {
        self.as_ref().submit(url, content_type, body).await
    }
}

/// A successful submission: the ACS response together with the candidate
/// format that produced it. The flow needs the format for interactive
/// follow-up submissions.
#[derive(Debug, Clone)]
pub struct ChallengeSubmission {
    pub response: RawAcsResponse,
    pub format: ChallengeFormat,
}

/// How the challenge exchange reaches the ACS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportStrategy {
    /// POST the candidate bodies directly from the app process. Best-effort
    /// fallback for ACS configurations that tolerate it.
    #[default]
    DirectPost,
    /// Open the challenge in the system browser and wait for the deep-link
    /// callback. The correct general strategy for mobile 3DS.
    BrowserRedirect,
}

impl TransportStrategy {
    /// Selection policy: direct POST whenever the host can submit HTTP from
    /// within the app process, browser redirect otherwise. Kept as a plain
    /// function so the policy is testable instead of a build-time choice of
    /// handler.
    pub fn for_environment(can_post_inline: bool) -> TransportStrategy {
        if can_post_inline {
            TransportStrategy::DirectPost
        } else {
            TransportStrategy::BrowserRedirect
        }
    }
}

/// Tries each candidate in order against `url`, stopping at the first 2xx.
///
/// Each submission is bounded by `timeout`; the timeout aborts the in-flight
/// request rather than letting it complete after the caller has given up.
/// When every candidate is exhausted the error carries the last HTTP
/// status and body — never an assumed success.
#[instrument(name = "threeds.probe_formats", skip(transport, candidates), fields(url = %url, candidates = candidates.len()))]
pub async fn probe_formats(
    transport: &dyn AcsTransport,
    url: &Url,
    candidates: &[ChallengeFormat],
    timeout: Duration,
) -> Result<(RawAcsResponse, ChallengeFormat), ThreeDsError> {
    let mut last_rejection: Option<RawAcsResponse> = None;
    let mut last_error: Option<TransportError> = None;
    for candidate in candidates {
        let submission = tokio::time::timeout(
            timeout,
            transport.submit(url, candidate.content_type, &candidate.body),
        );
        match submission.await {
            Err(_) => return Err(ThreeDsError::Timeout(timeout)),
            Ok(Ok(response)) if response.is_success() => {
                tracing::info!(format = %candidate.label, status = response.status, "ACS accepted challenge format");
                return Ok((response, candidate.clone()));
            }
            Ok(Ok(response)) => {
                tracing::debug!(format = %candidate.label, status = response.status, "ACS rejected challenge format");
                last_rejection = Some(response);
            }
            Ok(Err(error)) => {
                tracing::debug!(format = %candidate.label, %error, "challenge submission failed");
                last_error = Some(error);
            }
        }
    }
    match (last_rejection, last_error) {
        (Some(rejection), _) => Err(ThreeDsError::TransportFailed {
            status: rejection.status,
            body: rejection.body,
        }),
        (None, Some(error)) => Err(ThreeDsError::Transport(error)),
        (None, None) => Err(ThreeDsError::Configuration(
            "no challenge format candidates to submit".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FormatLabel;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Result<RawAcsResponse, TransportError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<RawAcsResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl AcsTransport for ScriptedTransport {
        async fn submit(
            &self,
            _url: &Url,
            _content_type: ContentType,
            body: &str,
        ) -> Result<RawAcsResponse, TransportError> {
            self.seen.lock().unwrap().push(body.to_string());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn format(label: FormatLabel, body: &str) -> ChallengeFormat {
        ChallengeFormat {
            label,
            content_type: ContentType::UrlEncodedForm,
            body: body.to_string(),
        }
    }

    fn url() -> Url {
        Url::parse("https://acs.example/creq").unwrap()
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawAcsResponse { status: 400, body: "bad".to_string() }),
            Ok(RawAcsResponse { status: 200, body: "ok".to_string() }),
        ]);
        let candidates = vec![
            format(FormatLabel::V2Creq, "creq=a"),
            format(FormatLabel::V2CreqSessionData, "creq=a&threeDSSessionData=t"),
            format(FormatLabel::V2CreqCapitalized, "cReq=a"),
        ];
        let (response, winner) =
            probe_formats(&transport, &url(), &candidates, Duration::from_secs(5))
                .await
                .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(winner.label, FormatLabel::V2CreqSessionData);
        assert_eq!(
            *transport.seen.lock().unwrap(),
            vec!["creq=a".to_string(), "creq=a&threeDSSessionData=t".to_string()]
        );
    }

    #[tokio::test]
    async fn exhausted_candidates_surface_last_status() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawAcsResponse { status: 500, body: "first".to_string() }),
            Ok(RawAcsResponse { status: 502, body: "last".to_string() }),
        ]);
        let candidates = vec![
            format(FormatLabel::V2Creq, "creq=a"),
            format(FormatLabel::V2CreqSessionData, "creq=a&threeDSSessionData=t"),
        ];
        let error = probe_formats(&transport, &url(), &candidates, Duration::from_secs(5))
            .await
            .unwrap_err();
        match error {
            ThreeDsError::TransportFailed { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "last");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strategy_policy_is_explicit() {
        assert_eq!(
            TransportStrategy::for_environment(true),
            TransportStrategy::DirectPost
        );
        assert_eq!(
            TransportStrategy::for_environment(false),
            TransportStrategy::BrowserRedirect
        );
    }
}
