//! Device-data collection: the fingerprint POST that precedes every payment
//! attempt.
//!
//! Collection is fire-and-forget. The outcome is informational — it feeds
//! logging and issuer-side risk scoring, never the payment decision. The
//! flow runs it before any challenge submission, swallows its failures, and
//! proceeds regardless; that is an explicit policy, not an oversight.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::{Url, form_urlencoded};

use crate::builder::ContentType;
use crate::device::DeviceDataProvider;
use crate::error::ThreeDsError;
use crate::timestamp::UnixTimestamp;
use crate::transport::AcsTransport;

/// Form field carrying the collection access token.
const JWT_FIELD: &str = "JWT";
/// Form field carrying the gateway reference id.
const REFERENCE_ID_FIELD: &str = "referenceId";

/// Input to fingerprint collection, created from the session-setup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCollectionDescriptor {
    pub collection_url: Url,
    pub access_token: String,
    pub reference_id: String,
    pub transaction_id: String,
}

/// What collection achieved. `completed` is best-effort truth: a 2xx means
/// the endpoint acknowledged the fingerprint, the grace path means we
/// stopped waiting and assumed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub completed: bool,
    pub completed_at: UnixTimestamp,
}

/// Submits the device fingerprint form to the collection endpoint.
///
/// The body is `application/x-www-form-urlencoded` with `JWT`,
/// `referenceId` and the fixed device-emulation fields from the injected
/// provider. The POST runs on a detached task: the `grace` delay and the
/// `timeout` stop the wait, never the request itself. Completion is declared
/// on the first of a 2xx response or the grace delay; exceeding `timeout`
/// raises [`ThreeDsError::DataCollection`], which the flow logs and ignores.
#[instrument(name = "threeds.collect", skip_all, fields(url = %descriptor.collection_url, reference_id = %descriptor.reference_id))]
pub async fn collect(
    transport: Arc<dyn AcsTransport>,
    device: &dyn DeviceDataProvider,
    descriptor: &DataCollectionDescriptor,
    timeout: Duration,
    grace: Duration,
) -> Result<CollectionOutcome, ThreeDsError> {
    let body = collection_form(device, descriptor);
    let url = descriptor.collection_url.clone();
    let mut submission = tokio::spawn(async move {
        transport
            .submit(&url, ContentType::UrlEncodedForm, &body)
            .await
    });
    let bounded = tokio::time::timeout(timeout, async {
        tokio::select! {
            joined = &mut submission => match joined {
                Ok(Ok(response)) if response.is_success() => {
                    tracing::debug!(status = response.status, "collection endpoint acknowledged fingerprint");
                    true
                }
                Ok(Ok(response)) => {
                    tracing::debug!(status = response.status, "collection endpoint rejected fingerprint");
                    false
                }
                Ok(Err(error)) => {
                    tracing::debug!(%error, "collection submission failed");
                    false
                }
                Err(error) => {
                    tracing::debug!(%error, "collection task did not run to completion");
                    false
                }
            },
            _ = tokio::time::sleep(grace) => {
                tracing::debug!(grace = ?grace, "collection grace delay elapsed, assuming delivery");
                true
            }
        }
    });
    match bounded.await {
        Ok(completed) => Ok(CollectionOutcome {
            completed,
            completed_at: UnixTimestamp::now(),
        }),
        Err(_) => Err(ThreeDsError::DataCollection(format!(
            "collection did not complete within {timeout:?}"
        ))),
    }
}

/// Builds the urlencoded fingerprint form.
fn collection_form(device: &dyn DeviceDataProvider, descriptor: &DataCollectionDescriptor) -> String {
    let (width, height) = device.screen_size();
    form_urlencoded::Serializer::new(String::new())
        .append_pair(JWT_FIELD, &descriptor.access_token)
        .append_pair(REFERENCE_ID_FIELD, &descriptor.reference_id)
        .append_pair("browserLanguage", &device.language())
        .append_pair("browserScreenWidth", &width.to_string())
        .append_pair("browserScreenHeight", &height.to_string())
        .append_pair(
            "browserTimezoneOffset",
            &device.timezone_offset_minutes().to_string(),
        )
        .append_pair("browserUserAgent", &device.user_agent())
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NoopDeviceData;
    use crate::transport::{RawAcsResponse, TransportError};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ImmediateTransport {
        status: u16,
    }

    #[async_trait::async_trait]
    impl AcsTransport for ImmediateTransport {
        async fn submit(
            &self,
            _url: &Url,
            _content_type: ContentType,
            _body: &str,
        ) -> Result<RawAcsResponse, TransportError> {
            Ok(RawAcsResponse {
                status: self.status,
                body: String::new(),
            })
        }
    }

    struct StalledTransport;

    #[async_trait::async_trait]
    impl AcsTransport for StalledTransport {
        async fn submit(
            &self,
            _url: &Url,
            _content_type: ContentType,
            _body: &str,
        ) -> Result<RawAcsResponse, TransportError> {
            std::future::pending().await
        }
    }

    fn descriptor() -> DataCollectionDescriptor {
        DataCollectionDescriptor {
            collection_url: Url::parse("https://collect.example/fingerprint").unwrap(),
            access_token: "jwt-abc".to_string(),
            reference_id: "ref-1".to_string(),
            transaction_id: "txn-1".to_string(),
        }
    }

    struct SlowAckTransport {
        acknowledged: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl AcsTransport for SlowAckTransport {
        async fn submit(
            &self,
            _url: &Url,
            _content_type: ContentType,
            _body: &str,
        ) -> Result<RawAcsResponse, TransportError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.acknowledged.store(true, Ordering::SeqCst);
            Ok(RawAcsResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn reachable_endpoint_completes_within_timeout() {
        let transport = Arc::new(ImmediateTransport { status: 200 });
        let outcome = collect(
            transport,
            &NoopDeviceData,
            &descriptor(),
            Duration::from_secs(10),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert!(outcome.completed);
    }

    #[tokio::test]
    async fn grace_delay_declares_completion_for_slow_endpoints() {
        let outcome = collect(
            Arc::new(StalledTransport),
            &NoopDeviceData,
            &descriptor(),
            Duration::from_secs(10),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert!(outcome.completed);
    }

    #[tokio::test]
    async fn grace_delay_detaches_the_submission_instead_of_aborting_it() {
        let acknowledged = Arc::new(AtomicBool::new(false));
        let transport = Arc::new(SlowAckTransport {
            acknowledged: acknowledged.clone(),
        });
        let outcome = collect(
            transport,
            &NoopDeviceData,
            &descriptor(),
            Duration::from_secs(10),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert!(outcome.completed);
        assert!(!acknowledged.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(
            acknowledged.load(Ordering::SeqCst),
            "fingerprint POST must keep running after the grace delay"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_times_out_without_panicking() {
        let error = collect(
            Arc::new(StalledTransport),
            &NoopDeviceData,
            &descriptor(),
            Duration::from_millis(20),
            Duration::from_secs(60),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ThreeDsError::DataCollection(_)));
    }

    #[test]
    fn form_carries_token_reference_and_device_fields() {
        let body = collection_form(&NoopDeviceData, &descriptor());
        assert!(body.contains("JWT=jwt-abc"));
        assert!(body.contains("referenceId=ref-1"));
        assert!(body.contains("browserLanguage=en-US"));
        assert!(body.contains("browserScreenWidth=390"));
        assert!(body.contains("browserTimezoneOffset=0"));
        assert!(body.contains("browserUserAgent="));
    }
}
