//! Stage interface error types.

use std::time::Duration;

use smx_transport::TransportError;
use thiserror::Error;

/// Errors from typed stage operations.
#[derive(Error, Debug)]
pub enum StageError {
    /// Transport or framing failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Caller passed a value the stage cannot act on.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The connected firmware lacks this operation.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The stage answered with something other than the expected response.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A config response that cannot be decoded as a full record.
    #[error("Invalid config packet: {0}")]
    InvalidConfig(String),

    /// A config write landed inside the minimum write interval.
    #[error("Config write rate limited, retry in {}ms", retry_in.as_millis())]
    RateLimited { retry_in: Duration },

    /// No stage matched the selection.
    #[error("Stage not found: {0}")]
    NotFound(String),
}
