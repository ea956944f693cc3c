//! Utility types shared across the crate.
//!
//! - [`Base64Bytes`] — zero-copy wrapper over base64-encoded payload bytes.

mod b64;

pub use b64::Base64Bytes;
