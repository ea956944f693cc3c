//! 3-D Secure authentication flows for mobile payment clients.
//!
//! This crate drives the card-authentication exchange that sits between a
//! payment attempt and its completion: device-data collection, protocol
//! version detection, challenge submission against an ACS (the issuer's
//! Access Control Server), user-interaction mediation, and response
//! normalization. It is transport-agnostic; the HTTP-backed transport lives
//! in the separate `threeds-reqwest` crate.
//!
//! # Overview
//!
//! A payment-initialization response ([`session::PaymentInitResponse`])
//! yields descriptors for fingerprint collection and, when the issuer
//! demands it, a challenge. A [`flow::ThreeDsFlow`] runs collection
//! (best-effort, never blocking the payment), classifies the challenge as
//! 3DS 1.0 or 2.0, submits the ordered candidate wire formats until the ACS
//! accepts one, mediates any interactive prompt through the host
//! application, and parses the final response into an
//! [`parse::AuthenticationResult`].
//!
//! # Modules
//!
//! - [`builder`] - Ordered candidate wire formats for challenge submission
//! - [`challenge`] - Challenge descriptor and validation
//! - [`collect`] - Fire-and-forget device-data collection
//! - [`config`] - Per-flow timeouts and transport strategy
//! - [`device`] - Device-data provider seam for fingerprint fields
//! - [`error`] - Error taxonomy for the flow internals
//! - [`flow`] - The per-attempt state machine
//! - [`interaction`] - Challenge-page classification and prompt mediation
//! - [`parse`] - ACS response normalization
//! - [`proto`] - Protocol versions, wire fields, and version detection
//! - [`redirect`] - Browser-redirect strategy and deep-link callbacks
//! - [`session`] - Descriptor extraction from the payment-init response
//! - [`timestamp`] - Unix timestamp utilities
//! - [`transport`] - The ACS transport seam and the candidate probe
//! - [`util`] - Helper types (base64 payloads)
//!
//! # Protocol Versions
//!
//! Both generations of the protocol are supported and selected per attempt:
//!
//! - **1.0** ([`proto::v1`]): `PaReq`/`PaRes` form exchange with `TermUrl`
//!   and `MD`
//! - **2.0** ([`proto::v2`]): EMVCo `CReq`/`CRes` messages, base64-encoded
//!   JSON

pub mod builder;
pub mod challenge;
pub mod collect;
pub mod config;
pub mod device;
pub mod error;
pub mod flow;
pub mod interaction;
pub mod parse;
pub mod proto;
pub mod redirect;
pub mod session;
pub mod timestamp;
pub mod transport;
pub mod util;

pub use challenge::ChallengeDescriptor;
pub use collect::DataCollectionDescriptor;
pub use config::FlowConfig;
pub use error::ThreeDsError;
pub use flow::{FlowState, ThreeDsFlow};
pub use parse::{AuthenticationResult, AuthenticationStatus};
pub use proto::ProtocolVersion;
pub use session::PaymentInitResponse;
pub use transport::{AcsTransport, RawAcsResponse, TransportError, TransportStrategy};
