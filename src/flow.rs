//! The per-attempt 3-D Secure flow state machine.
//!
//! One [`ThreeDsFlow`] drives exactly one authentication attempt:
//!
//! ```text
//! NotStarted -> DataCollecting -> DataCollected
//!   -> { no challenge: Done }
//!   -> { Classifying -> Submitting
//!          [-> AwaitingUserInput -> Submitting]
//!          -> ParsingResponse -> Done }
//! ```
//!
//! Terminal states are `Done` with a success or failure result; there are no
//! implicit retries across terminal failures. A fresh attempt needs a fresh
//! flow with a fresh descriptor. Each flow owns its descriptors, timers and
//! handlers, so concurrent attempts share no mutable state.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::instrument;
use url::Url;

use crate::builder;
use crate::challenge::ChallengeDescriptor;
use crate::collect::{CollectionOutcome, DataCollectionDescriptor, collect};
use crate::config::FlowConfig;
use crate::device::{DeviceDataProvider, NoopDeviceData};
use crate::error::ThreeDsError;
use crate::interaction::{
    CancelingHandler, InteractionHandler, PromptContext, PromptOutcome, detect_interaction,
};
use crate::parse::{AuthenticationResult, parse};
use crate::proto::{ProtocolVersion, detect_version};
use crate::redirect::{DeepLinkCallback, UrlOpener, build_redirect_url};
use crate::timestamp::UnixTimestamp;
use crate::transport::{AcsTransport, ChallengeSubmission, TransportStrategy, probe_formats};

/// Observable position of the flow in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    NotStarted,
    DataCollecting,
    DataCollected,
    Classifying,
    Submitting,
    /// Waiting on the user: an interactive prompt, or the browser round-trip
    /// of the redirect strategy.
    AwaitingUserInput,
    ParsingResponse,
    Done,
}

/// Drives one authentication attempt over an injected transport.
pub struct ThreeDsFlow<T> {
    /// Shared so data collection can detach its POST onto a background task.
    transport: Arc<T>,
    interaction: Arc<dyn InteractionHandler>,
    device: Arc<dyn DeviceDataProvider>,
    opener: Option<Arc<dyn UrlOpener>>,
    deep_link: Option<oneshot::Receiver<Url>>,
    config: FlowConfig,
    state: FlowState,
}

impl<T: AcsTransport + 'static> ThreeDsFlow<T> {
    /// A flow with default configuration, no-op device data, and an
    /// interaction handler that cancels every prompt. Hosts that expect
    /// interactive challenges must install a real handler.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            interaction: Arc::new(CancelingHandler),
            device: Arc::new(NoopDeviceData),
            opener: None,
            deep_link: None,
            config: FlowConfig::default(),
            state: FlowState::NotStarted,
        }
    }

    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_interaction_handler(mut self, handler: Arc<dyn InteractionHandler>) -> Self {
        self.interaction = handler;
        self
    }

    pub fn with_device_data(mut self, device: Arc<dyn DeviceDataProvider>) -> Self {
        self.device = device;
        self
    }

    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Installs the channel on which the app's deep-link handler delivers
    /// the browser callback URL. Required for the redirect strategy.
    pub fn with_deep_link_receiver(mut self, receiver: oneshot::Receiver<Url>) -> Self {
        self.deep_link = Some(receiver);
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Runs device-data collection. Always executed before any challenge;
    /// failures are logged and swallowed — fingerprinting is best-effort and
    /// never blocks the payment attempt.
    #[instrument(name = "threeds.flow.collect", skip_all, fields(reference_id = %descriptor.reference_id))]
    pub async fn collect_device_data(
        &mut self,
        descriptor: &DataCollectionDescriptor,
    ) -> CollectionOutcome {
        self.state = FlowState::DataCollecting;
        let outcome = collect(
            self.transport.clone(),
            self.device.as_ref(),
            descriptor,
            self.config.collection_timeout,
            self.config.collection_grace,
        )
        .await;
        self.state = FlowState::DataCollected;
        match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "device data collection failed, proceeding with payment");
                CollectionOutcome {
                    completed: false,
                    completed_at: UnixTimestamp::now(),
                }
            }
        }
    }

    /// Marks the attempt done when the payment completed without a
    /// challenge.
    pub fn finish_without_challenge(&mut self) {
        self.state = FlowState::Done;
    }

    /// Runs the challenge exchange to a terminal result.
    ///
    /// Never panics and never hangs on cancellation: every internal error is
    /// folded into a failure result whose message reflects the error class
    /// ("cancelled" for user cancellation, "failed" otherwise). Calling this
    /// on a terminal flow yields a failure; start a fresh flow instead.
    #[instrument(name = "threeds.flow.authenticate", skip_all, fields(transaction_id = %descriptor.transaction_id))]
    pub async fn authenticate(&mut self, descriptor: &ChallengeDescriptor) -> AuthenticationResult {
        if self.state == FlowState::Done {
            return failure_from_error(ThreeDsError::InvalidState(
                "flow already reached a terminal state".to_string(),
            ));
        }
        if self.state == FlowState::NotStarted {
            tracing::debug!("challenge submitted without prior device data collection");
        }
        self.state = FlowState::Classifying;
        let result = match self.run_challenge(descriptor).await {
            Ok(result) => result,
            Err(error) => failure_from_error(error),
        };
        self.state = FlowState::Done;
        tracing::info!(
            success = result.success,
            status = %result.status,
            format = result.format_used.map(|f| f.to_string()),
            "authentication attempt finished"
        );
        result
    }

    async fn run_challenge(
        &mut self,
        descriptor: &ChallengeDescriptor,
    ) -> Result<AuthenticationResult, ThreeDsError> {
        descriptor.validate()?;
        let version = detect_version(descriptor);
        match self.config.strategy {
            TransportStrategy::DirectPost => self.run_direct(descriptor, version).await,
            TransportStrategy::BrowserRedirect => self.run_redirect(descriptor, version).await,
        }
    }

    async fn run_direct(
        &mut self,
        descriptor: &ChallengeDescriptor,
        version: ProtocolVersion,
    ) -> Result<AuthenticationResult, ThreeDsError> {
        let submission = self.submit_and_interact(descriptor, version).await?;
        self.state = FlowState::ParsingResponse;
        match parse(&submission.response.body) {
            Ok(result) => Ok(result.with_format(submission.format.label)),
            Err(ThreeDsError::VersionMismatch) if version == ProtocolVersion::V1 => {
                tracing::info!("ACS reported a version mismatch, escalating to 3DS 2.0 formats");
                let submission = self
                    .submit_and_interact(descriptor, ProtocolVersion::V2)
                    .await?;
                self.state = FlowState::ParsingResponse;
                Ok(parse(&submission.response.body)?.with_format(submission.format.label))
            }
            Err(error) => Err(error),
        }
    }

    /// Probes the candidate formats and, when the ACS answers with an
    /// interactive page, mediates the prompt and performs the follow-up
    /// submission with the user input merged in.
    async fn submit_and_interact(
        &mut self,
        descriptor: &ChallengeDescriptor,
        version: ProtocolVersion,
    ) -> Result<ChallengeSubmission, ThreeDsError> {
        self.state = FlowState::Submitting;
        let candidates = builder::build(descriptor, version)?;
        let url = descriptor.submission_url();
        let (response, format) = probe_formats(
            &self.transport,
            url,
            &candidates,
            self.config.submit_timeout,
        )
        .await?;

        let Some(kind) = detect_interaction(&response.body) else {
            return Ok(ChallengeSubmission { response, format });
        };

        self.state = FlowState::AwaitingUserInput;
        let context = PromptContext {
            transaction_id: descriptor.transaction_id.clone(),
            page_excerpt: excerpt(&response.body),
        };
        tracing::debug!(%kind, "ACS requires user interaction");
        match self.interaction.prompt(kind, &context).await {
            PromptOutcome::Cancelled => Err(ThreeDsError::Cancelled),
            PromptOutcome::Submitted { input } => {
                self.state = FlowState::Submitting;
                let follow_up = match (kind.input_field(), input) {
                    (Some(field), Some(value)) => format.with_field(field, &value),
                    _ => format.clone(),
                };
                let response = tokio::time::timeout(
                    self.config.submit_timeout,
                    self.transport
                        .submit(url, follow_up.content_type, &follow_up.body),
                )
                .await
                .map_err(|_| ThreeDsError::Timeout(self.config.submit_timeout))??;
                if !response.is_success() {
                    return Err(ThreeDsError::TransportFailed {
                        status: response.status,
                        body: response.body,
                    });
                }
                Ok(ChallengeSubmission { response, format })
            }
        }
    }

    async fn run_redirect(
        &mut self,
        descriptor: &ChallengeDescriptor,
        version: ProtocolVersion,
    ) -> Result<AuthenticationResult, ThreeDsError> {
        let return_url = self.config.deep_link_return.clone().ok_or_else(|| {
            ThreeDsError::Configuration(
                "browser-redirect strategy requires a deep-link return URL".to_string(),
            )
        })?;
        let opener = self.opener.clone().ok_or_else(|| {
            ThreeDsError::Configuration(
                "browser-redirect strategy requires a URL opener".to_string(),
            )
        })?;
        let receiver = self.deep_link.take().ok_or_else(|| {
            ThreeDsError::Configuration(
                "browser-redirect strategy requires a deep-link receiver".to_string(),
            )
        })?;

        self.state = FlowState::Submitting;
        let challenge_url = build_redirect_url(descriptor, version, &return_url)?;
        opener.open(&challenge_url)?;

        // Unbounded by design: the application imposes its own ceiling on
        // the browser round-trip.
        self.state = FlowState::AwaitingUserInput;
        let callback_url = receiver.await.map_err(|_| {
            ThreeDsError::DeepLink("deep-link channel closed before a callback arrived".to_string())
        })?;

        self.state = FlowState::ParsingResponse;
        let callback = DeepLinkCallback::parse(&callback_url)?;
        if callback.transaction_id != descriptor.transaction_id {
            return Err(ThreeDsError::DeepLink(format!(
                "callback transactionId {} does not match attempt {}",
                callback.transaction_id, descriptor.transaction_id
            )));
        }
        Ok(callback.into_result())
    }
}

/// Folds an internal error into the caller-visible result. Cancellation
/// keeps its "cancelled" wording; everything else reads as a failure, with
/// the detail retained in logs.
fn failure_from_error(error: ThreeDsError) -> AuthenticationResult {
    tracing::warn!(%error, "authentication attempt failed");
    match error {
        ThreeDsError::Cancelled => {
            AuthenticationResult::failure("authentication cancelled by the user")
        }
        ThreeDsError::TransportFailed { status, .. } => AuthenticationResult::failure(format!(
            "authentication failed: ACS rejected every challenge format (last status {status})"
        )),
        ThreeDsError::Timeout(timeout) => AuthenticationResult::failure(format!(
            "authentication failed: timed out after {timeout:?}"
        )),
        other => AuthenticationResult::failure(format!("authentication failed: {other}")),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ContentType, FormatLabel};
    use crate::parse::AuthenticationStatus;
    use crate::transport::{RawAcsResponse, TransportError};
    use crate::util::Base64Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockTransport {
        responses: Mutex<Vec<RawAcsResponse>>,
        seen: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| RawAcsResponse {
                            status,
                            body: body.to_string(),
                        })
                        .collect(),
                ),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn bodies(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl AcsTransport for MockTransport {
        async fn submit(
            &self,
            _url: &Url,
            _content_type: ContentType,
            body: &str,
        ) -> Result<RawAcsResponse, TransportError> {
            self.seen.lock().unwrap().push(body.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::Http("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }
    }

    fn v1_descriptor() -> ChallengeDescriptor {
        ChallengeDescriptor {
            challenge_url: Url::parse("https://acs.example/pareq").unwrap(),
            acs_url: None,
            token: "jwt".to_string(),
            payload: Some(Base64Bytes::encode("legacy-pareq").to_string()),
            term_url: Some(Url::parse("https://merchant.example/return").unwrap()),
            md: Some("md-1".to_string()),
            transaction_id: "txn-1".to_string(),
            challenge_window_size: None,
            version_hint: None,
        }
    }

    fn v2_descriptor() -> ChallengeDescriptor {
        let creq = serde_json::json!({"messageType": "CReq", "messageVersion": "2.1.0"});
        ChallengeDescriptor {
            challenge_url: Url::parse("https://acs.example/3ds2/stepup").unwrap(),
            acs_url: None,
            token: "jwt".to_string(),
            payload: Some(Base64Bytes::encode(creq.to_string()).to_string()),
            term_url: None,
            md: None,
            transaction_id: "txn-2".to_string(),
            challenge_window_size: None,
            version_hint: None,
        }
    }

    fn cres_body(trans_status: &str, eci: &str) -> String {
        let cres = Base64Bytes::encode(
            serde_json::json!({"transStatus": trans_status, "eci": eci}).to_string(),
        );
        format!(r#"<input type="hidden" name="cres" value="{cres}">"#)
    }

    #[tokio::test]
    async fn scenario_a_v1_pares_success() {
        let transport = MockTransport::new(vec![(
            200,
            r#"<input type="hidden" name="PaRes" value="XYZ">"#,
        )]);
        let mut flow = ThreeDsFlow::new(transport);
        let result = flow.authenticate(&v1_descriptor()).await;
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);
        assert_eq!(result.eci.as_deref(), Some("05"));
        assert_eq!(result.raw_response.as_deref(), Some("XYZ"));
        assert_eq!(result.format_used, Some(FormatLabel::V1Form));
        assert_eq!(flow.state(), FlowState::Done);
    }

    #[tokio::test]
    async fn scenario_b_second_v2_candidate_wins() {
        let cres = cres_body("Y", "05");
        let transport = MockTransport::new(vec![(400, "bad request"), (200, &cres)]);
        let mut flow = ThreeDsFlow::new(transport);
        let result = flow.authenticate(&v2_descriptor()).await;
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);
        assert_eq!(result.eci.as_deref(), Some("05"));
        assert_eq!(result.format_used, Some(FormatLabel::V2CreqSessionData));
        let bodies = flow.transport.bodies();
        assert_eq!(bodies.len(), 2, "candidates (c)-(e) must not be attempted");
        assert!(bodies[0].starts_with("creq="));
        assert!(bodies[1].contains("threeDSSessionData=txn-2"));
    }

    #[tokio::test]
    async fn scenario_c_exhausted_candidates_fail() {
        let transport = MockTransport::new(vec![
            (500, "boom"),
            (500, "boom"),
            (500, "boom"),
            (500, "boom"),
            (500, "boom"),
        ]);
        let mut flow = ThreeDsFlow::new(transport);
        let result = flow.authenticate(&v2_descriptor()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn cancellation_resolves_immediately_with_cancelled_message() {
        let transport = MockTransport::new(vec![(
            200,
            "<form>Enter the one-time password we sent by SMS</form>",
        )]);
        let mut flow = ThreeDsFlow::new(transport);
        let result = flow.authenticate(&v1_descriptor()).await;
        assert!(!result.success);
        let message = result.error.as_deref().unwrap();
        assert!(message.contains("cancelled"));
        assert!(!message.contains("failed"));
        assert_eq!(flow.state(), FlowState::Done);
    }

    struct SubmitOtp;

    #[async_trait::async_trait]
    impl InteractionHandler for SubmitOtp {
        async fn prompt(&self, _kind: InteractionKind, _context: &PromptContext) -> PromptOutcome {
            PromptOutcome::Submitted {
                input: Some("123456".to_string()),
            }
        }
    }

    use crate::interaction::InteractionKind;

    #[tokio::test]
    async fn otp_prompt_feeds_follow_up_submission() {
        let transport = MockTransport::new(vec![
            (200, "<form>Enter the one-time password we sent by SMS</form>"),
            (200, r#"<input name="PaRes" value="OK1">"#),
        ]);
        let mut flow =
            ThreeDsFlow::new(transport).with_interaction_handler(Arc::new(SubmitOtp));
        let result = flow.authenticate(&v1_descriptor()).await;
        assert!(result.success);
        let bodies = flow.transport.bodies();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[1].contains("otp=123456"));
    }

    #[tokio::test]
    async fn version_mismatch_escalates_to_v2_candidates() {
        let cres = cres_body("Y", "05");
        let transport = MockTransport::new(vec![
            (200, "Integration Error: 3DS 1.0 Form POST to a 3DS 2.0 Endpoint"),
            (200, &cres),
        ]);
        let mut flow = ThreeDsFlow::new(transport);
        let result = flow.authenticate(&v1_descriptor()).await;
        assert!(result.success);
        assert_eq!(result.format_used, Some(FormatLabel::V2Creq));
        let bodies = flow.transport.bodies();
        assert!(bodies[0].contains("PaReq="));
        assert!(bodies[1].starts_with("creq="));
    }

    #[tokio::test]
    async fn data_collection_failure_is_swallowed() {
        struct Stalled;

        #[async_trait::async_trait]
        impl AcsTransport for Stalled {
            async fn submit(
                &self,
                _url: &Url,
                _content_type: ContentType,
                _body: &str,
            ) -> Result<RawAcsResponse, TransportError> {
                std::future::pending().await
            }
        }

        let config = FlowConfig::new()
            .collection_timeout(Duration::from_millis(20))
            .collection_grace(Duration::from_secs(60));
        let mut flow = ThreeDsFlow::new(Stalled).with_config(config);
        let descriptor = DataCollectionDescriptor {
            collection_url: Url::parse("https://collect.example/ddc").unwrap(),
            access_token: "jwt".to_string(),
            reference_id: "ref".to_string(),
            transaction_id: "txn".to_string(),
        };
        let outcome = flow.collect_device_data(&descriptor).await;
        assert!(!outcome.completed);
        assert_eq!(flow.state(), FlowState::DataCollected);
    }

    struct RecordingOpener(Mutex<Option<Url>>);

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &Url) -> Result<(), ThreeDsError> {
            *self.0.lock().unwrap() = Some(url.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn browser_redirect_waits_for_deep_link_callback() {
        let (sender, receiver) = oneshot::channel();
        let opener = Arc::new(RecordingOpener(Mutex::new(None)));
        let config = FlowConfig::new()
            .browser_redirect(Url::parse("myapp://threeds/return").unwrap());
        let transport = MockTransport::new(vec![]);
        let mut flow = ThreeDsFlow::new(transport)
            .with_config(config)
            .with_url_opener(opener.clone())
            .with_deep_link_receiver(receiver);

        sender
            .send(Url::parse("myapp://threeds/return?transactionId=txn-2&status=Y").unwrap())
            .unwrap();
        let result = flow.authenticate(&v2_descriptor()).await;
        assert!(result.success);
        assert_eq!(result.status, AuthenticationStatus::Authenticated);

        let opened = opener.0.lock().unwrap().clone().unwrap();
        assert!(opened.query().unwrap().contains("creq="));
        assert!(opened.query().unwrap().contains("returnUrl="));
    }

    #[tokio::test]
    async fn mismatched_callback_transaction_id_fails() {
        let (sender, receiver) = oneshot::channel();
        let config = FlowConfig::new()
            .browser_redirect(Url::parse("myapp://threeds/return").unwrap());
        let mut flow = ThreeDsFlow::new(MockTransport::new(vec![]))
            .with_config(config)
            .with_url_opener(Arc::new(RecordingOpener(Mutex::new(None))))
            .with_deep_link_receiver(receiver);

        sender
            .send(Url::parse("myapp://threeds/return?transactionId=other&status=Y").unwrap())
            .unwrap();
        let result = flow.authenticate(&v2_descriptor()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn terminal_flow_rejects_reuse() {
        let transport = MockTransport::new(vec![(
            200,
            r#"<input name="PaRes" value="XYZ">"#,
        )]);
        let mut flow = ThreeDsFlow::new(transport);
        let first = flow.authenticate(&v1_descriptor()).await;
        assert!(first.success);
        let second = flow.authenticate(&v1_descriptor()).await;
        assert!(!second.success);
        let message = second.error.as_deref().unwrap();
        assert!(message.contains("invalid flow state"));
        assert!(message.contains("terminal"));
    }
}
