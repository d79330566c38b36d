//! HID-backed report channel.

use std::time::Duration;

use hidapi::HidDevice;
use parking_lot::Mutex;

use crate::discovery::StageDescriptor;
use crate::error::TransportError;
use crate::protocol::{RawReport, REPORT_SIZE};
use crate::ReportChannel;

/// A report channel over an open hidraw handle.
///
/// `HidDevice` is not `Sync`, so the handle lives behind a mutex. The reader
/// thread holds it for at most one poll interval per read, which bounds how
/// long a writer can be kept waiting.
pub struct HidReportChannel {
    device: Mutex<HidDevice>,
    descriptor: StageDescriptor,
}

impl HidReportChannel {
    pub(crate) fn new(device: HidDevice, descriptor: StageDescriptor) -> Self {
        Self {
            device: Mutex::new(device),
            descriptor,
        }
    }

    /// Identity of the stage this channel talks to.
    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }
}

impl ReportChannel for HidReportChannel {
    fn write_report(&self, report: &RawReport) -> Result<usize, TransportError> {
        Ok(self.device.lock().write(report)?)
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<RawReport>, TransportError> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let mut report = [0u8; REPORT_SIZE];
        let len = self.device.lock().read_timeout(&mut report, timeout_ms)?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(report))
    }

    fn set_blocking(&self, blocking: bool) -> Result<(), TransportError> {
        Ok(self.device.lock().set_blocking_mode(blocking)?)
    }
}
