//! Report transport layer for StepManiaX stage communication
//!
//! This crate handles everything below typed commands:
//!
//! - discovery and opening of stages over hidraw
//! - framing of commands into 64-byte reports and reassembly of responses
//! - one reader thread per session routing command responses and panel
//!   input events
//! - serialization of command/response cycles on a session

pub mod error;
pub mod framing;
pub mod protocol;
pub mod testing;
pub mod types;

mod discovery;
mod hid_channel;
mod reader;
mod session;

use std::time::Duration;

pub use discovery::{list_stages, open_stage, StageDescriptor};
pub use error::TransportError;
pub use framing::{encode_command, Assembled, CompletedCommand, PacketAssembler};
pub use hid_channel::HidReportChannel;
pub use protocol::{RawReport, REPORT_SIZE};
pub use session::StageSession;
pub use types::StageEvent;

/// A bidirectional 64-byte report pipe to one stage.
///
/// [`HidReportChannel`] is the real implementation;
/// [`testing::ScriptedChannel`] stands in for it in tests. All methods take
/// `&self` so a session can write while its reader thread reads.
pub trait ReportChannel: Send + Sync {
    /// Write one report, report ID included. Returns bytes accepted.
    fn write_report(&self, report: &RawReport) -> Result<usize, TransportError>;

    /// Read one report, waiting up to `timeout`. `Ok(None)` on timeout.
    fn read_report(&self, timeout: Duration) -> Result<Option<RawReport>, TransportError>;

    /// Switch the handle between blocking and non-blocking reads.
    fn set_blocking(&self, blocking: bool) -> Result<(), TransportError>;
}
