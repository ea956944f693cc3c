//! Device data capability for fingerprint collection.
//!
//! The collection form carries a fixed set of browser-emulation fields. The
//! values come from an injected capability rather than a runtime probe for
//! an optional device-info dependency; hosts without real device data use
//! [`NoopDeviceData`].

/// Supplies the device/browser-emulation fields submitted during data
/// collection.
pub trait DeviceDataProvider: Send + Sync {
    /// BCP-47 language tag, e.g. `en-US`.
    fn language(&self) -> String;
    /// Screen size in pixels, `(width, height)`.
    fn screen_size(&self) -> (u32, u32);
    /// Offset from UTC in minutes, as `Date.prototype.getTimezoneOffset`
    /// reports it (positive west of UTC).
    fn timezone_offset_minutes(&self) -> i32;
    /// User-agent string submitted with the fingerprint.
    fn user_agent(&self) -> String;
}

/// Fallback provider with fixed, plausible values. Keeps collection
/// functional on hosts that expose no device information.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDeviceData;

impl DeviceDataProvider for NoopDeviceData {
    fn language(&self) -> String {
        "en-US".to_string()
    }

    fn screen_size(&self) -> (u32, u32) {
        (390, 844)
    }

    fn timezone_offset_minutes(&self) -> i32 {
        0
    }

    fn user_agent(&self) -> String {
        concat!("threeds-rs/", env!("CARGO_PKG_VERSION")).to_string()
    }
}
