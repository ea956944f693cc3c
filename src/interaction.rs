//! User-interaction mediation for interactive challenges.
//!
//! When the ACS answers with a page that demands input (OTP, password,
//! biometric confirmation) the flow classifies the page, prompts through the
//! injected [`InteractionHandler`], and feeds the input back into a
//! follow-up submission. Classification is substring-based and best-effort;
//! anything unrecognized falls back to [`InteractionKind::Generic`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// What the ACS demands from the cardholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    OtpSms,
    OtpApp,
    Biometric,
    Password,
    Redirect,
    Generic,
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InteractionKind::OtpSms => "otp_sms",
            InteractionKind::OtpApp => "otp_app",
            InteractionKind::Biometric => "biometric",
            InteractionKind::Password => "password",
            InteractionKind::Redirect => "redirect",
            InteractionKind::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

impl InteractionKind {
    /// The form field the submitted input is merged under. `None` for
    /// confirm-only kinds, which add no field to the follow-up submission.
    pub fn input_field(&self) -> Option<&'static str> {
        match self {
            InteractionKind::OtpSms | InteractionKind::OtpApp => Some("otp"),
            InteractionKind::Password => Some("password"),
            InteractionKind::Biometric | InteractionKind::Redirect | InteractionKind::Generic => {
                None
            }
        }
    }

    /// Whether the prompt collects free text (OTP, password) or is a bare
    /// confirmation.
    pub fn is_free_text(&self) -> bool {
        self.input_field().is_some()
    }
}

/// Context handed to the prompt so a host UI can render something sensible.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub transaction_id: String,
    /// Leading excerpt of the challenge page, for display or logging.
    pub page_excerpt: String,
}

/// Outcome of one prompt. Cancellation at any point resolves the whole
/// attempt as a failure whose message says "cancelled" — never a hang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user responded. `input` is `Some` for free-text prompts and
    /// `None` for confirm-only ones.
    Submitted { input: Option<String> },
    Cancelled,
}

/// Host-side prompt capability: idle → prompting → {submitted, cancelled}.
#[async_trait::async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn prompt(&self, kind: InteractionKind, context: &PromptContext) -> PromptOutcome;
}

/// Fallback handler used when the host installs none. Resolves every
/// interactive challenge as cancelled instead of hanging the flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelingHandler;

#[async_trait::async_trait]
impl InteractionHandler for CancelingHandler {
    async fn prompt(&self, kind: InteractionKind, _context: &PromptContext) -> PromptOutcome {
        tracing::warn!(%kind, "no interaction handler installed, cancelling prompt");
        PromptOutcome::Cancelled
    }
}

/// Markers whose presence means the page is an interactive challenge.
/// Ordered: the first matching classification wins.
const OTP_SMS_MARKERS: &[&str] = &["sms", "text message", "mobile number ending"];
const OTP_APP_MARKERS: &[&str] = &["authenticator app", "banking app", "approve in your app"];
const OTP_MARKERS: &[&str] = &["one-time password", "one time password", "otp", "verification code"];
const BIOMETRIC_MARKERS: &[&str] = &["biometric", "fingerprint", "face id", "touch id"];
const PASSWORD_MARKERS: &[&str] = &["enter your password", "3d secure password", "secure code"];
const REDIRECT_MARKERS: &[&str] = &["redirecting", "you are being redirected", "window.location"];
const GENERIC_MARKERS: &[&str] = &["challenge", "verification required", "confirm your identity"];

/// Fields whose presence means the exchange already resolved; such pages go
/// straight to the parser.
const RESOLVED_MARKERS: &[&str] = &["pares", "cres"];

/// Decides whether a fetched challenge page demands user interaction, and of
/// what kind. Returns `None` when the page carries a resolved protocol field
/// or no interactive marker at all.
pub fn detect_interaction(page: &str) -> Option<InteractionKind> {
    let page = page.to_ascii_lowercase();
    if RESOLVED_MARKERS.iter().any(|m| page.contains(m)) {
        return None;
    }
    let contains_any = |markers: &[&str]| markers.iter().any(|m| page.contains(m));
    let has_otp = contains_any(OTP_MARKERS);
    let kind = if has_otp && contains_any(OTP_SMS_MARKERS) {
        InteractionKind::OtpSms
    } else if has_otp && contains_any(OTP_APP_MARKERS) {
        InteractionKind::OtpApp
    } else if has_otp {
        InteractionKind::OtpSms
    } else if contains_any(BIOMETRIC_MARKERS) {
        InteractionKind::Biometric
    } else if contains_any(PASSWORD_MARKERS) {
        InteractionKind::Password
    } else if contains_any(REDIRECT_MARKERS) {
        InteractionKind::Redirect
    } else if contains_any(GENERIC_MARKERS) && page.contains("<form") {
        InteractionKind::Generic
    } else {
        return None;
    };
    Some(kind)
}
