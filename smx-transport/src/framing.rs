//! Command framing: splitting outbound commands into reports and
//! reassembling inbound reports into complete payloads.
//!
//! A command of any length (including zero) becomes a run of fixed-size
//! reports. The first carries [`flags::START_OF_COMMAND`], the last
//! [`flags::END_OF_COMMAND`]; a command that fits one report carries both.
//! The device frames its responses the same way in the other direction.

use tracing::warn;
use zerocopy::FromBytes;

use crate::protocol::{flags, report_id, RawReport, ReportHeader, HEADER_SIZE, MAX_PAYLOAD, REPORT_SIZE};

/// Split `command` into wire reports.
///
/// Always produces at least one report: an empty command becomes a single
/// report with start and end flags and zero length. Payload bytes beyond
/// the declared length are zero.
pub fn encode_command(command: &[u8]) -> Vec<RawReport> {
    let mut reports = Vec::with_capacity(command.len() / MAX_PAYLOAD + 1);
    let mut offset = 0usize;
    loop {
        let chunk = (command.len() - offset).min(MAX_PAYLOAD);
        let mut report = [0u8; REPORT_SIZE];
        report[0] = report_id::COMMAND_OUT;
        let mut flag_bits = 0u8;
        if offset == 0 {
            flag_bits |= flags::START_OF_COMMAND;
        }
        if offset + chunk == command.len() {
            flag_bits |= flags::END_OF_COMMAND;
        }
        report[1] = flag_bits;
        report[2] = chunk as u8;
        report[HEADER_SIZE..HEADER_SIZE + chunk].copy_from_slice(&command[offset..offset + chunk]);
        reports.push(report);
        offset += chunk;
        if offset >= command.len() {
            break;
        }
    }
    reports
}

/// Outcome of feeding one report to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// Report consumed; the command is not complete yet.
    Incomplete,
    /// An end-of-command report finalized a payload.
    Complete(CompletedCommand),
    /// Not a command-channel report; nothing was consumed.
    Ignored,
}

/// A fully reassembled command payload and the framing flags seen while
/// collecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCommand {
    /// Concatenated payload bytes in arrival order.
    pub payload: Vec<u8>,
    /// The device signalled it finished the previous host command.
    pub host_cmd_finished: bool,
    /// The payload is a device-info broadcast.
    pub device_info: bool,
}

impl CompletedCommand {
    /// The acknowledgement report viewed as a completed empty command.
    pub fn acknowledgement() -> Self {
        Self {
            payload: Vec::new(),
            host_cmd_finished: true,
            device_info: false,
        }
    }
}

/// Reassembles command payloads from inbound reports.
///
/// One instance per stage. The session owns it behind the command lock, so
/// at most one command's reports flow through it at a time.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    buffer: Vec<u8>,
    host_cmd_finished: bool,
    device_info: bool,
    resyncs: u64,
    dropped: u64,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound report.
    ///
    /// Reports on other report IDs are ignored. A report whose declared
    /// length exceeds its capacity is dropped without touching the buffer.
    /// A start flag arriving while bytes are buffered discards the stale
    /// partial payload and begins a fresh command from this report.
    pub fn push(&mut self, report: &RawReport) -> Assembled {
        let Ok((header, body)) = ReportHeader::read_from_prefix(report.as_slice()) else {
            return Assembled::Ignored;
        };
        if header.report_id != report_id::COMMAND_IN {
            return Assembled::Ignored;
        }
        let length = header.length as usize;
        if length > body.len() {
            warn!(
                "dropping report declaring {length} payload bytes (capacity {})",
                body.len()
            );
            self.dropped += 1;
            return Assembled::Incomplete;
        }
        if header.flags & flags::START_OF_COMMAND != 0 && !self.buffer.is_empty() {
            warn!(
                "start of command with {} bytes buffered, resynchronizing",
                self.buffer.len()
            );
            self.resyncs += 1;
            self.buffer.clear();
            self.host_cmd_finished = false;
            self.device_info = false;
        }
        self.buffer.extend_from_slice(&body[..length]);
        if header.flags & flags::HOST_CMD_FINISHED != 0 {
            self.host_cmd_finished = true;
        }
        if header.flags & flags::DEVICE_INFO != 0 {
            self.device_info = true;
        }
        if header.flags & flags::END_OF_COMMAND != 0 {
            let completed = CompletedCommand {
                payload: std::mem::take(&mut self.buffer),
                host_cmd_finished: self.host_cmd_finished,
                device_info: self.device_info,
            };
            self.host_cmd_finished = false;
            self.device_info = false;
            return Assembled::Complete(completed);
        }
        Assembled::Incomplete
    }

    /// Discard partial command state (used when a command is abandoned).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.host_cmd_finished = false;
        self.device_info = false;
    }

    /// Bytes buffered for the in-flight command.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reports dropped for declaring an impossible length.
    pub fn dropped_reports(&self) -> u64 {
        self.dropped
    }

    /// Times a stale partial payload was discarded at a start flag.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}
