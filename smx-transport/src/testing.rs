//! In-memory report channel for exercising session logic without hardware.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::framing::encode_command;
use crate::protocol::{flags, report_id, RawReport, ACK_FLAGS, REPORT_SIZE};
use crate::ReportChannel;

#[derive(Default)]
struct ScriptState {
    exchanges: VecDeque<Vec<RawReport>>,
    readable: VecDeque<RawReport>,
    written: Vec<RawReport>,
}

/// A scripted stand-in for the HID channel.
///
/// Responses are queued per exchange and released only once a complete
/// outbound command has been written (its end-flagged report, or the raw
/// device-info request). Releasing early would let the session's
/// stale-report drain swallow them before the command goes out.
#[derive(Default)]
pub struct ScriptedChannel {
    state: Mutex<ScriptState>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the responses for the next complete outbound command.
    pub fn push_exchange(&self, responses: Vec<RawReport>) {
        self.state.lock().exchanges.push_back(responses);
    }

    /// Make a report readable immediately, as if the stage pushed it
    /// unprompted.
    pub fn push_readable(&self, report: RawReport) {
        self.state.lock().readable.push_back(report);
    }

    /// Every report written so far, in order.
    pub fn written(&self) -> Vec<RawReport> {
        self.state.lock().written.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().written.len()
    }
}

impl ReportChannel for ScriptedChannel {
    fn write_report(&self, report: &RawReport) -> Result<usize, crate::TransportError> {
        let mut state = self.state.lock();
        state.written.push(*report);
        let completes_command = report[0] == report_id::COMMAND_OUT
            && report[1] & (flags::END_OF_COMMAND | flags::DEVICE_INFO) != 0;
        if completes_command {
            if let Some(responses) = state.exchanges.pop_front() {
                state.readable.extend(responses);
            }
        }
        Ok(REPORT_SIZE)
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<RawReport>, crate::TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(report) = self.state.lock().readable.pop_front() {
                return Ok(Some(report));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn set_blocking(&self, _blocking: bool) -> Result<(), crate::TransportError> {
        Ok(())
    }
}

/// Frame `payload` the way a stage frames a response.
pub fn response_reports(payload: &[u8]) -> Vec<RawReport> {
    encode_command(payload)
        .into_iter()
        .map(|mut report| {
            report[0] = report_id::COMMAND_IN;
            report
        })
        .collect()
}

/// Frame `payload` as a device-info broadcast response.
pub fn broadcast_reports(payload: &[u8]) -> Vec<RawReport> {
    response_reports(payload)
        .into_iter()
        .map(|mut report| {
            report[1] |= flags::DEVICE_INFO;
            report
        })
        .collect()
}

/// The bare acknowledgement report.
pub fn ack_report() -> RawReport {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = report_id::COMMAND_IN;
    report[1] = ACK_FLAGS;
    report
}

/// An input-state report carrying `mask`.
pub fn input_report(mask: u16) -> RawReport {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = report_id::INPUT_STATE;
    report[1..3].copy_from_slice(&mask.to_le_bytes());
    report
}
