//! Stage discovery and opening.
//!
//! Stages enumerate with the Arduino Micro's vendor and product IDs, so the
//! product string is part of the match: anything not reporting itself as
//! "StepManiaX" is some other Arduino-compatible board.

use std::thread;
use std::time::Duration;

use hidapi::HidApi;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::hid_channel::HidReportChannel;
use crate::protocol::{device, timing};

/// Identity of a discovered stage, as reported by HID enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct StageDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// USB serial string, when the platform exposes one.
    pub serial: Option<String>,
    pub product: Option<String>,
    /// Platform device path used to open the handle.
    pub path: String,
}

fn is_stage(info: &hidapi::DeviceInfo) -> bool {
    info.vendor_id() == device::VENDOR_ID
        && info.product_id() == device::PRODUCT_ID
        && info.product_string() == Some(device::PRODUCT_NAME)
}

/// Enumerate connected stages.
pub fn list_stages() -> Result<Vec<StageDescriptor>, TransportError> {
    let api = HidApi::new()?;
    let stages: Vec<StageDescriptor> = api
        .device_list()
        .filter(|d| is_stage(d))
        .map(|d| StageDescriptor {
            vendor_id: d.vendor_id(),
            product_id: d.product_id(),
            serial: d.serial_number().map(str::to_owned),
            product: d.product_string().map(str::to_owned),
            path: d.path().to_string_lossy().into_owned(),
        })
        .collect();
    info!("Found {} stages", stages.len());
    Ok(stages)
}

/// Open a report channel to a previously discovered stage.
///
/// Opening can race a replug, so a few attempts are made before giving up.
/// Permission errors are reported immediately since retrying cannot fix
/// missing udev rules.
pub fn open_stage(descriptor: &StageDescriptor) -> Result<HidReportChannel, TransportError> {
    let mut last_err = None;
    for attempt in 1..=timing::OPEN_RETRIES {
        match try_open(descriptor) {
            Ok(channel) => {
                debug!("opened stage at {} (attempt {attempt})", descriptor.path);
                return Ok(channel);
            }
            Err(e @ TransportError::HidPermissionDenied(_)) => return Err(e),
            Err(e) => {
                warn!("open attempt {attempt}/{} failed: {e}", timing::OPEN_RETRIES);
                last_err = Some(e);
                thread::sleep(Duration::from_millis(timing::OPEN_RETRY_DELAY_MS));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| TransportError::DeviceNotFound(descriptor.path.clone())))
}

fn try_open(descriptor: &StageDescriptor) -> Result<HidReportChannel, TransportError> {
    let api = HidApi::new()?;
    let Some(info) = api
        .device_list()
        .find(|d| is_stage(d) && d.path().to_string_lossy() == descriptor.path.as_str())
    else {
        return Err(TransportError::DeviceNotFound(format!(
            "no stage at {}",
            descriptor.path
        )));
    };
    let device = info.open_device(&api)?;
    Ok(HidReportChannel::new(device, descriptor.clone()))
}
