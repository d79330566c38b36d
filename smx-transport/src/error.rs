//! Transport layer error types.

use thiserror::Error;

/// Errors from report transport and framing.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No stage matched, or the handle could not be opened.
    #[error("Stage not found: {0}")]
    DeviceNotFound(String),

    /// The stage went away mid-session.
    #[error("Stage disconnected")]
    Disconnected,

    /// No response within the command deadline.
    #[error("Command timed out")]
    Timeout,

    /// The HID layer accepted fewer bytes than one full report.
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Error from the HID layer.
    #[error("HID error: {0}")]
    HidError(String),

    /// Permission denied opening the device (udev rules not installed).
    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    /// Internal error (thread or channel failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(err: hidapi::HidError) -> Self {
        let msg = err.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
