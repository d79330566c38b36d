//! Background report reader.
//!
//! One OS thread per session pulls reports off the HID handle and routes
//! them: command responses go to the session's bounded queue, input-state
//! reports go straight to the broadcast channel so they are never delayed
//! behind an in-flight command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::protocol::{input_state_mask, report_id, timing, RawReport};
use crate::types::StageEvent;
use crate::ReportChannel;

pub(crate) fn run_report_reader(
    channel: Arc<dyn ReportChannel>,
    reports: mpsc::Sender<RawReport>,
    events: broadcast::Sender<StageEvent>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("report reader thread started");
    let poll = Duration::from_millis(timing::READ_TIMEOUT_MS);
    while !shutdown.load(Ordering::SeqCst) {
        match channel.read_report(poll) {
            Ok(Some(report)) => match report[0] {
                report_id::COMMAND_IN => match reports.try_send(report) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("report queue full, dropping command report");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                },
                report_id::INPUT_STATE => {
                    if let Some(mask) = input_state_mask(&report) {
                        // Err here just means nobody is subscribed right now.
                        let _ = events.send(StageEvent::InputState { mask });
                    }
                }
                other => trace!("ignoring report with ID 0x{other:02X}"),
            },
            Ok(None) => {} // poll timeout, re-check shutdown
            Err(e) => {
                warn!("report read failed: {e}");
                thread::sleep(Duration::from_millis(timing::ERROR_SLEEP_MS));
            }
        }
    }
    debug!("report reader thread exiting");
}
