//! Sensor diagnostic frames.
//!
//! The stage returns test data as a bit-interleaved stream: 80 little-endian
//! words, where bit `p` of each word belongs to panel `p`. De-interleaving
//! panel `p` yields a 10-byte record: a flags byte, four signed 16-bit
//! sensor readings, and a DIP switch / jumper byte. Panels that are not
//! populated answer with a wrong signature and stay zeroed in the decoded
//! frame, keeping the remaining panels at their own indices.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use smx_transport::protocol::cmd;

use crate::error::StageError;
use crate::{PANEL_COUNT, SENSOR_COUNT};

/// Size of one de-interleaved per-panel record.
pub const DETAIL_RECORD_SIZE: usize = 10;

/// Words in the interleaved stream: eight per record byte.
const WORDS_PER_RECORD: usize = DETAIL_RECORD_SIZE * 8;

/// Minimum interleaved payload size in bytes.
const INTERLEAVED_SIZE: usize = WORDS_PER_RECORD * 2;

/// Panels answer diagnostics with this signature in the low flag bits;
/// anything else means the panel is absent or out of sync.
const SIGNATURE_MASK: u8 = 0b0000_0111;
const SIGNATURE_PRESENT: u8 = 0b0000_0010;

/// Which measurement a diagnostic frame samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorTestMode {
    /// Stop streaming test data.
    Off,
    /// Raw readings with no calibration applied.
    UncalibratedValues,
    /// Readings after calibration.
    CalibratedValues,
    /// Sampled noise amplitude.
    Noise,
    /// Current tare offsets.
    Tare,
}

impl SensorTestMode {
    /// Byte sent with [`cmd::GET_SENSOR_TEST_DATA`].
    pub fn wire(self) -> u8 {
        match self {
            SensorTestMode::Off => 0,
            SensorTestMode::UncalibratedValues => b'0',
            SensorTestMode::CalibratedValues => b'1',
            SensorTestMode::Noise => b'2',
            SensorTestMode::Tare => b'3',
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SensorTestMode::Off),
            b'0' => Some(SensorTestMode::UncalibratedValues),
            b'1' => Some(SensorTestMode::CalibratedValues),
            b'2' => Some(SensorTestMode::Noise),
            b'3' => Some(SensorTestMode::Tare),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorTestMode::Off => "off",
            SensorTestMode::UncalibratedValues => "uncalibrated",
            SensorTestMode::CalibratedValues => "calibrated",
            SensorTestMode::Noise => "noise",
            SensorTestMode::Tare => "tare",
        }
    }
}

/// One panel's de-interleaved record as laid out on the wire.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawDetailRecord {
    /// Signature in bits 0..=2, bad-sensor flags in bits 3..=6.
    flags: u8,
    /// Four signed little-endian readings.
    sensors: [[u8; 2]; SENSOR_COUNT],
    /// DIP switch in the low nibble, bad-jumper flags in the high nibble.
    dip_jumper: u8,
}

/// Decoded diagnostics for one panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelDiagnostics {
    /// The panel answered with the expected signature. When false, every
    /// other field is zero.
    pub present: bool,
    /// One reading per sensor, meaning depends on the requested mode.
    pub sensors: [i16; SENSOR_COUNT],
    /// Sensors the panel itself has flagged bad.
    pub bad_sensors: [bool; SENSOR_COUNT],
    /// The panel's DIP switch setting.
    pub dip_switch: u8,
    /// Sensors whose threshold jumper reads bad.
    pub bad_jumpers: [bool; SENSOR_COUNT],
}

/// One decoded diagnostic frame for the whole stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorTestData {
    /// Mode the frame was sampled in.
    pub mode: SensorTestMode,
    /// Per-panel records, indexed by panel number regardless of which
    /// panels are populated.
    pub panels: [PanelDiagnostics; PANEL_COUNT],
}

impl SensorTestData {
    /// Decode a `GET_SENSOR_TEST_DATA` response payload.
    ///
    /// Envelope: echoed opcode, the mode byte, a declared payload size,
    /// then the interleaved words. A frame echoing a different mode than
    /// requested is rejected rather than silently reinterpreted.
    pub fn from_response(payload: &[u8], requested: SensorTestMode) -> Result<Self, StageError> {
        if payload.len() < 3 {
            return Err(StageError::UnexpectedResponse(format!(
                "sensor test response too short: {} bytes",
                payload.len()
            )));
        }
        if payload[0] != cmd::GET_SENSOR_TEST_DATA {
            return Err(StageError::UnexpectedResponse(format!(
                "expected GET_SENSOR_TEST_DATA echo, got 0x{:02X}",
                payload[0]
            )));
        }
        let mode = SensorTestMode::from_wire(payload[1]).ok_or_else(|| {
            StageError::UnexpectedResponse(format!("unknown sensor test mode 0x{:02X}", payload[1]))
        })?;
        if mode != requested {
            return Err(StageError::UnexpectedResponse(format!(
                "frame sampled in mode {}, requested {}",
                mode.name(),
                requested.name()
            )));
        }
        let declared = payload[2] as usize;
        if payload.len() < 3 + declared {
            return Err(StageError::UnexpectedResponse(format!(
                "sensor test response declares {declared} bytes but carries {}",
                payload.len() - 3
            )));
        }
        Self::from_interleaved(mode, &payload[3..3 + declared])
    }

    /// Decode the bit-interleaved sample data itself.
    pub fn from_interleaved(mode: SensorTestMode, raw: &[u8]) -> Result<Self, StageError> {
        if raw.len() < INTERLEAVED_SIZE {
            return Err(StageError::UnexpectedResponse(format!(
                "interleaved frame is {} bytes, expected at least {INTERLEAVED_SIZE}",
                raw.len()
            )));
        }
        let mut words = [0u16; WORDS_PER_RECORD];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u16::from_le_bytes([raw[i * 2], raw[i * 2 + 1]]);
        }

        let mut panels = [PanelDiagnostics::default(); PANEL_COUNT];
        for (panel, diagnostics) in panels.iter_mut().enumerate() {
            let record = deinterleave_panel(&words, panel);
            let raw_record = RawDetailRecord::read_from_bytes(&record[..])
                .map_err(|_| StageError::UnexpectedResponse("detail record size mismatch".into()))?;
            if raw_record.flags & SIGNATURE_MASK != SIGNATURE_PRESENT {
                continue;
            }
            let mut sensors = [0i16; SENSOR_COUNT];
            for (slot, value) in sensors.iter_mut().enumerate() {
                *value = i16::from_le_bytes(raw_record.sensors[slot]);
            }
            *diagnostics = PanelDiagnostics {
                present: true,
                sensors,
                bad_sensors: core::array::from_fn(|i| raw_record.flags & (1 << (3 + i)) != 0),
                dip_switch: raw_record.dip_jumper & 0x0F,
                bad_jumpers: core::array::from_fn(|i| raw_record.dip_jumper & (1 << (4 + i)) != 0),
            };
        }
        Ok(Self { mode, panels })
    }
}

/// Extract panel `panel`'s record from the interleaved words: bit `panel`
/// of word `i * 8 + b` supplies bit `b` of record byte `i`.
fn deinterleave_panel(words: &[u16], panel: usize) -> [u8; DETAIL_RECORD_SIZE] {
    let mut record = [0u8; DETAIL_RECORD_SIZE];
    for (i, byte) in record.iter_mut().enumerate() {
        for bit in 0..8 {
            *byte |= (((words[i * 8 + bit] >> panel) & 1) as u8) << bit;
        }
    }
    record
}
