//! Protocol constants for StepManiaX stage communication.
//!
//! Stages talk over 64-byte HID reports on three numbered report IDs: host
//! commands out, device command responses in, and a separate input-state
//! report the device pushes on every panel change. Command payloads longer
//! than one report are split across reports and framed with flag bits.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Every HID report on the command and input channels is exactly this long.
pub const REPORT_SIZE: usize = 64;

/// One report as it crosses the wire, report ID included.
pub type RawReport = [u8; REPORT_SIZE];

/// Header bytes preceding the payload in a command-channel report.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ReportHeader {
    pub report_id: u8,
    pub flags: u8,
    /// Payload bytes carried by this report (0..=61).
    pub length: u8,
}

/// Bytes of header per command report.
pub const HEADER_SIZE: usize = core::mem::size_of::<ReportHeader>();

/// Payload capacity of one command report.
pub const MAX_PAYLOAD: usize = REPORT_SIZE - HEADER_SIZE;

/// HID report IDs used by the stage.
pub mod report_id {
    /// Host to device command report.
    pub const COMMAND_OUT: u8 = 5;
    /// Device to host command response report.
    pub const COMMAND_IN: u8 = 6;
    /// Unsolicited panel input state report.
    pub const INPUT_STATE: u8 = 3;
}

/// Framing flag bits (byte 1 of a command report).
pub mod flags {
    /// Last report of a command payload.
    pub const END_OF_COMMAND: u8 = 0x01;
    /// Device has finished the previous host command.
    pub const HOST_CMD_FINISHED: u8 = 0x02;
    /// First report of a command payload.
    pub const START_OF_COMMAND: u8 = 0x04;
    /// Payload is a device-info broadcast.
    pub const DEVICE_INFO: u8 = 0x80;
}

/// Command opcodes (first payload byte of a host command).
pub mod cmd {
    /// Request device identity.
    pub const GET_DEVICE_INFO: u8 = b'i';
    /// Read configuration, pre-v5 firmware.
    pub const GET_CONFIG: u8 = b'g';
    /// Read the 250-byte configuration record (firmware v5+).
    pub const GET_CONFIG_V5: u8 = b'G';
    /// Write configuration, pre-v5 firmware.
    pub const WRITE_CONFIG: u8 = b'w';
    /// Write the 250-byte configuration record (firmware v5+).
    pub const WRITE_CONFIG_V5: u8 = b'W';
    /// Restore firmware default configuration.
    pub const FACTORY_RESET: u8 = b'f';
    /// Set colors on an attached light strip.
    pub const SET_LIGHT_STRIP: u8 = b'L';
    /// Discard calibration and re-tare all sensors.
    pub const FORCE_RECALIBRATION: u8 = b'C';
    /// Request one sensor diagnostic frame.
    pub const GET_SENSOR_TEST_DATA: u8 = b'y';
    /// Echo byte on device-info responses.
    pub const DEVICE_INFO_ECHO: u8 = b'I';

    /// Human-readable opcode name for logging.
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            GET_DEVICE_INFO => "GET_DEVICE_INFO",
            GET_CONFIG => "GET_CONFIG",
            GET_CONFIG_V5 => "GET_CONFIG_V5",
            WRITE_CONFIG => "WRITE_CONFIG",
            WRITE_CONFIG_V5 => "WRITE_CONFIG_V5",
            FACTORY_RESET => "FACTORY_RESET",
            SET_LIGHT_STRIP => "SET_LIGHT_STRIP",
            FORCE_RECALIBRATION => "FORCE_RECALIBRATION",
            GET_SENSOR_TEST_DATA => "GET_SENSOR_TEST_DATA",
            _ => "UNKNOWN",
        }
    }
}

/// USB identity of a StepManiaX stage.
pub mod device {
    /// Stages reuse the Arduino vendor ID.
    pub const VENDOR_ID: u16 = 0x2341;
    /// Shared with the Arduino Micro, so the product string must match too.
    pub const PRODUCT_ID: u16 = 0x8037;
    /// Product string reported by real stages.
    pub const PRODUCT_NAME: &str = "StepManiaX";
}

/// Timing constants.
pub mod timing {
    /// Overall deadline for one command/response cycle (ms).
    pub const COMMAND_TIMEOUT_MS: u64 = 3000;
    /// Reader thread poll timeout; bounds shutdown latency (ms).
    pub const READ_TIMEOUT_MS: u64 = 5;
    /// Pause after a reader error before retrying (ms).
    pub const ERROR_SLEEP_MS: u64 = 100;
    /// Open attempts before reporting a stage as gone.
    pub const OPEN_RETRIES: usize = 3;
    /// Delay between open attempts (ms).
    pub const OPEN_RETRY_DELAY_MS: u64 = 50;
    /// Reader to session queue depth for command responses.
    pub const REPORT_QUEUE_CAPACITY: usize = 64;
    /// Broadcast channel depth for input events.
    pub const INPUT_CHANNEL_CAPACITY: usize = 256;
    /// Minimum spacing between configuration writes (ms).
    pub const CONFIG_WRITE_INTERVAL_MS: u64 = 1000;
}

/// Flag byte of the acknowledgement report a stage sends for commands
/// that carry no response payload.
pub const ACK_FLAGS: u8 =
    flags::END_OF_COMMAND | flags::HOST_CMD_FINISHED | flags::START_OF_COMMAND;

/// True if `report` is the distinguished acknowledgement report: command-in
/// ID, all three framing flags, zero length, zero padding.
pub fn is_ack(report: &RawReport) -> bool {
    report[0] == report_id::COMMAND_IN
        && report[1] == ACK_FLAGS
        && report[2..].iter().all(|&b| b == 0)
}

/// Build the raw device-info broadcast request.
///
/// This request predates the command framing: it carries the broadcast flag
/// alone, no start/end bits and no payload, and the stage answers with an
/// info payload flagged [`flags::DEVICE_INFO`].
pub fn device_info_request() -> RawReport {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = report_id::COMMAND_OUT;
    report[1] = flags::DEVICE_INFO;
    report
}

/// Extract the panel bitmask from an input-state report, if it is one.
pub fn input_state_mask(report: &RawReport) -> Option<u16> {
    if report[0] != report_id::INPUT_STATE {
        return None;
    }
    Some(u16::from_le_bytes([report[1], report[2]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_and_layout() {
        assert_eq!(core::mem::size_of::<ReportHeader>(), 3);
        assert_eq!(HEADER_SIZE + MAX_PAYLOAD, REPORT_SIZE);
    }

    #[test]
    fn test_ack_pattern() {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = report_id::COMMAND_IN;
        report[1] = ACK_FLAGS;
        assert!(is_ack(&report));

        // Any payload byte disqualifies the pattern.
        report[3] = 1;
        assert!(!is_ack(&report));
    }

    #[test]
    fn test_device_info_request_shape() {
        let report = device_info_request();
        assert_eq!(report[0], report_id::COMMAND_OUT);
        assert_eq!(report[1], flags::DEVICE_INFO);
        assert!(report[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_input_state_mask() {
        let mut report = [0u8; REPORT_SIZE];
        report[0] = report_id::INPUT_STATE;
        report[1] = 0x05;
        report[2] = 0x01;
        assert_eq!(input_state_mask(&report), Some(0x0105));

        report[0] = report_id::COMMAND_IN;
        assert_eq!(input_state_mask(&report), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(cmd::name(cmd::GET_CONFIG_V5), "GET_CONFIG_V5");
        assert_eq!(cmd::name(0x00), "UNKNOWN");
    }
}
