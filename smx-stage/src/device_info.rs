//! Device identity responses.

use serde::Serialize;
use smx_transport::protocol::cmd;

use crate::error::StageError;

/// Payload size of a device-info response.
pub const DEVICE_INFO_SIZE: usize = 23;

/// Identity a stage reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Serial number rendered as 32 uppercase hex digits.
    pub serial: String,
    pub firmware_version: u16,
    /// Player slot this stage is wired as, 1 or 2.
    pub player: u8,
}

impl DeviceInfo {
    /// Parse an `'I'` identity payload.
    ///
    /// Layout: echo byte, one unused byte, the 0-based player slot, another
    /// unused byte, 16 raw serial bytes, firmware version as a little-endian
    /// word, and a terminator.
    pub fn from_response(payload: &[u8]) -> Result<Self, StageError> {
        if payload.len() != DEVICE_INFO_SIZE {
            return Err(StageError::UnexpectedResponse(format!(
                "device info payload is {} bytes, expected {DEVICE_INFO_SIZE}",
                payload.len()
            )));
        }
        if payload[0] != cmd::DEVICE_INFO_ECHO {
            return Err(StageError::UnexpectedResponse(format!(
                "expected '{}' echo, got 0x{:02X}",
                cmd::DEVICE_INFO_ECHO as char,
                payload[0]
            )));
        }
        let player = payload[2].saturating_add(1);
        let serial = payload[4..20].iter().map(|b| format!("{b:02X}")).collect();
        let firmware_version = u16::from_le_bytes([payload[20], payload[21]]);
        Ok(Self {
            serial,
            firmware_version,
            player,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(player: u8, firmware: u16, serial: [u8; 16]) -> Vec<u8> {
        let mut p = vec![cmd::DEVICE_INFO_ECHO, 0, player, 0];
        p.extend_from_slice(&serial);
        p.extend_from_slice(&firmware.to_le_bytes());
        p.push(b'\n');
        p
    }

    #[test]
    fn test_parses_identity() {
        let mut serial = [0u8; 16];
        serial[0] = 0xDE;
        serial[1] = 0xAD;
        serial[15] = 0x0F;
        let info = DeviceInfo::from_response(&payload(0, 5, serial)).unwrap();
        assert_eq!(info.player, 1);
        assert_eq!(info.firmware_version, 5);
        assert_eq!(info.serial, "DEAD000000000000000000000000000F");
        assert_eq!(info.serial.len(), 32);
    }

    #[test]
    fn test_player_slot_is_one_based() {
        // The wire carries the 0-based slot; callers see 1 or 2.
        let info = DeviceInfo::from_response(&payload(1, 5, [0; 16])).unwrap();
        assert_eq!(info.player, 2);
    }

    #[test]
    fn test_firmware_version_is_little_endian() {
        let info = DeviceInfo::from_response(&payload(0, 0x0104, [0; 16])).unwrap();
        assert_eq!(info.firmware_version, 260);
    }

    #[test]
    fn test_rejects_wrong_echo() {
        let mut p = payload(0, 5, [0; 16]);
        p[0] = b'g';
        let err = DeviceInfo::from_response(&p).unwrap_err();
        assert!(matches!(err, StageError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut p = payload(0, 5, [0; 16]);
        p.pop();
        let err = DeviceInfo::from_response(&p).unwrap_err();
        assert!(matches!(err, StageError::UnexpectedResponse(_)));

        let err = DeviceInfo::from_response(&[]).unwrap_err();
        assert!(matches!(err, StageError::UnexpectedResponse(_)));
    }
}
