//! The stage configuration record.
//!
//! Firmware v5 stages store one 250-byte little-endian record. Reads return
//! it wrapped in a response envelope (command echo, declared size, record,
//! terminator); writes send the raw record after the write opcode. Decode
//! and encode walk [`CONFIG_FIELDS`] in order, so the layout table is the
//! single description of the wire format and the tests pin offsets against
//! it.

use std::fmt;

use smx_transport::protocol::cmd;

use crate::error::StageError;
use crate::{PANEL_COUNT, SENSOR_COUNT};

/// Size of the configuration record on the wire.
pub const CONFIG_SIZE: usize = 250;

/// Size of one packed per-panel settings block.
pub const SENSOR_SETTINGS_SIZE: usize = 16;

const PADDING_SIZE: usize = 49;

/// Bits of [`StageConfig::flags`].
pub mod config_flags {
    /// Auto-lighting uses the pressed-panel animation instead of a solid
    /// color.
    pub const AUTO_LIGHTING_USE_PRESSED_ANIMATIONS: u8 = 1 << 0;
    /// Panels are fitted with FSR sensors rather than load cells.
    pub const FSR: u8 = 1 << 1;
}

/// One RGB color as the firmware stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Per-panel sensor thresholds, packed to 16 bytes on the wire.
///
/// Which threshold pair applies depends on the sensors fitted: load cell
/// panels use the load cell pair, FSR panels use the per-sensor FSR arrays.
/// `0xFF` (`0xFFFF` for the combined pair) disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedSensorSettings {
    pub load_cell_low_threshold: u8,
    pub load_cell_high_threshold: u8,
    pub fsr_low_threshold: [u8; SENSOR_COUNT],
    pub fsr_high_threshold: [u8; SENSOR_COUNT],
    pub combined_low_threshold: u16,
    pub combined_high_threshold: u16,
    /// Firmware-internal; round-trips unchanged.
    pub reserved: u16,
}

impl Default for PackedSensorSettings {
    fn default() -> Self {
        Self {
            load_cell_low_threshold: 0xFF,
            load_cell_high_threshold: 0xFF,
            fsr_low_threshold: [0xFF; SENSOR_COUNT],
            fsr_high_threshold: [0xFF; SENSOR_COUNT],
            combined_low_threshold: 0xFFFF,
            combined_high_threshold: 0xFFFF,
            reserved: 0,
        }
    }
}

impl PackedSensorSettings {
    fn decode(r: &mut FieldReader<'_>) -> Self {
        Self {
            load_cell_low_threshold: r.u8(),
            load_cell_high_threshold: r.u8(),
            fsr_low_threshold: r.array(),
            fsr_high_threshold: r.array(),
            combined_low_threshold: r.u16(),
            combined_high_threshold: r.u16(),
            reserved: r.u16(),
        }
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u8(self.load_cell_low_threshold);
        w.u8(self.load_cell_high_threshold);
        w.bytes(&self.fsr_low_threshold);
        w.bytes(&self.fsr_high_threshold);
        w.u16(self.combined_low_threshold);
        w.u16(self.combined_high_threshold);
        w.u16(self.reserved);
    }
}

/// The full stage configuration record.
///
/// Defaults mirror what firmware v5 reports after a factory reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Firmware version of the master controller; filled in by the stage.
    pub master_version: u8,
    /// Record format version, 0x05 for this layout.
    pub config_version: u8,
    /// Packed option bits, see [`config_flags`].
    pub flags: u8,
    pub debounce_no_delay_ms: u16,
    pub debounce_delay_ms: u16,
    /// Debounce applied inside the panel microcontroller, in microseconds.
    pub panel_debounce_us: u16,
    pub auto_calibration_max_deviation: u8,
    /// How long a sensor must misread before it is flagged bad.
    pub bad_sensor_minimum_delay_seconds: u8,
    pub auto_calibration_averages_per_update: u16,
    pub auto_calibration_samples_per_average: u16,
    /// Ceiling for auto-calibration tare, except at startup.
    pub auto_calibration_max_tare: u16,
    /// Sensor-enable bitmasks; lets unpopulated sensors be masked off.
    pub enabled_sensors: [u8; 5],
    /// How long the stage waits for host lights before resuming
    /// auto-lighting, in 128 ms units.
    pub auto_lights_timeout: u8,
    /// Auto-lighting color per panel, normally scaled to 0..=170.
    pub step_color: [Rgb; PANEL_COUNT],
    /// Color applied to the platform LED strip at power-on.
    pub platform_strip_color: Rgb,
    /// Which panels auto-lighting may light, one bit per panel.
    pub auto_light_panel_mask: u16,
    /// Stage rotation in 90 degree steps, 0 = cabled edge up.
    pub panel_rotation: u8,
    pub panel_settings: [PackedSensorSettings; PANEL_COUNT],
    pub pre_details_delay_ms: u8,
    /// Unused tail of the record; round-trips unchanged.
    pub padding: [u8; PADDING_SIZE],
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            master_version: 0xFF,
            config_version: 0x05,
            flags: 0,
            debounce_no_delay_ms: 0,
            debounce_delay_ms: 0,
            panel_debounce_us: 4000,
            auto_calibration_max_deviation: 100,
            bad_sensor_minimum_delay_seconds: 15,
            auto_calibration_averages_per_update: 60,
            auto_calibration_samples_per_average: 500,
            auto_calibration_max_tare: 0xFFFF,
            enabled_sensors: [0xFF; 5],
            auto_lights_timeout: 7, // one second in 128 ms units
            step_color: [Rgb::default(); PANEL_COUNT],
            platform_strip_color: Rgb::default(),
            auto_light_panel_mask: 0xFFFF,
            panel_rotation: 0,
            panel_settings: [PackedSensorSettings::default(); PANEL_COUNT],
            pre_details_delay_ms: 5,
            padding: [0xFF; PADDING_SIZE],
        }
    }
}

impl StageConfig {
    /// Decode a raw 250-byte record.
    pub fn decode(bytes: &[u8]) -> Result<Self, StageError> {
        if bytes.len() != CONFIG_SIZE {
            return Err(StageError::InvalidConfig(format!(
                "expected a {CONFIG_SIZE}-byte record, got {}",
                bytes.len()
            )));
        }
        let mut r = FieldReader::new(bytes);
        let master_version = r.u8();
        let config_version = r.u8();
        let flags = r.u8();
        let debounce_no_delay_ms = r.u16();
        let debounce_delay_ms = r.u16();
        let panel_debounce_us = r.u16();
        let auto_calibration_max_deviation = r.u8();
        let bad_sensor_minimum_delay_seconds = r.u8();
        let auto_calibration_averages_per_update = r.u16();
        let auto_calibration_samples_per_average = r.u16();
        let auto_calibration_max_tare = r.u16();
        let enabled_sensors = r.array();
        let auto_lights_timeout = r.u8();
        let mut step_color = [Rgb::default(); PANEL_COUNT];
        for color in &mut step_color {
            *color = Rgb::new(r.u8(), r.u8(), r.u8());
        }
        let platform_strip_color = Rgb::new(r.u8(), r.u8(), r.u8());
        let auto_light_panel_mask = r.u16();
        let panel_rotation = r.u8();
        let mut panel_settings = [PackedSensorSettings::default(); PANEL_COUNT];
        for settings in &mut panel_settings {
            *settings = PackedSensorSettings::decode(&mut r);
        }
        let pre_details_delay_ms = r.u8();
        let padding = r.array();
        debug_assert_eq!(r.consumed(), CONFIG_SIZE);
        Ok(Self {
            master_version,
            config_version,
            flags,
            debounce_no_delay_ms,
            debounce_delay_ms,
            panel_debounce_us,
            auto_calibration_max_deviation,
            bad_sensor_minimum_delay_seconds,
            auto_calibration_averages_per_update,
            auto_calibration_samples_per_average,
            auto_calibration_max_tare,
            enabled_sensors,
            auto_lights_timeout,
            step_color,
            platform_strip_color,
            auto_light_panel_mask,
            panel_rotation,
            panel_settings,
            pre_details_delay_ms,
            padding,
        })
    }

    /// Encode back to the raw 250-byte record.
    pub fn encode(&self) -> [u8; CONFIG_SIZE] {
        let mut w = FieldWriter::new(CONFIG_SIZE);
        w.u8(self.master_version);
        w.u8(self.config_version);
        w.u8(self.flags);
        w.u16(self.debounce_no_delay_ms);
        w.u16(self.debounce_delay_ms);
        w.u16(self.panel_debounce_us);
        w.u8(self.auto_calibration_max_deviation);
        w.u8(self.bad_sensor_minimum_delay_seconds);
        w.u16(self.auto_calibration_averages_per_update);
        w.u16(self.auto_calibration_samples_per_average);
        w.u16(self.auto_calibration_max_tare);
        w.bytes(&self.enabled_sensors);
        w.u8(self.auto_lights_timeout);
        for color in &self.step_color {
            w.bytes(&[color.r, color.g, color.b]);
        }
        w.bytes(&[
            self.platform_strip_color.r,
            self.platform_strip_color.g,
            self.platform_strip_color.b,
        ]);
        w.u16(self.auto_light_panel_mask);
        w.u8(self.panel_rotation);
        for settings in &self.panel_settings {
            settings.encode(&mut w);
        }
        w.u8(self.pre_details_delay_ms);
        w.bytes(&self.padding);
        w.finish()
    }

    /// Decode a config read response.
    ///
    /// The envelope is the echoed opcode, a declared record size, the record
    /// bytes, then a terminator byte past the declared payload (ignored).
    pub fn from_response(payload: &[u8], expect_echo: u8) -> Result<Self, StageError> {
        if payload.len() < 2 {
            return Err(StageError::InvalidConfig(format!(
                "config response too short: {} bytes",
                payload.len()
            )));
        }
        if payload[0] != expect_echo {
            return Err(StageError::UnexpectedResponse(format!(
                "expected {} echo, got 0x{:02X}",
                cmd::name(expect_echo),
                payload[0]
            )));
        }
        let declared = payload[1] as usize;
        if payload.len() < declared + 2 {
            return Err(StageError::InvalidConfig(format!(
                "config response declares {declared} bytes but carries {}",
                payload.len() - 2
            )));
        }
        Self::decode(&payload[2..2 + declared])
    }
}

/// Wire layout of [`StageConfig`]: field name and width in bytes, in record
/// order. `decode`/`encode` consume fields in exactly this sequence.
pub const CONFIG_FIELDS: &[(&str, usize)] = &[
    ("master_version", 1),
    ("config_version", 1),
    ("flags", 1),
    ("debounce_no_delay_ms", 2),
    ("debounce_delay_ms", 2),
    ("panel_debounce_us", 2),
    ("auto_calibration_max_deviation", 1),
    ("bad_sensor_minimum_delay_seconds", 1),
    ("auto_calibration_averages_per_update", 2),
    ("auto_calibration_samples_per_average", 2),
    ("auto_calibration_max_tare", 2),
    ("enabled_sensors", 5),
    ("auto_lights_timeout", 1),
    ("step_color", 3 * PANEL_COUNT),
    ("platform_strip_color", 3),
    ("auto_light_panel_mask", 2),
    ("panel_rotation", 1),
    ("panel_settings", SENSOR_SETTINGS_SIZE * PANEL_COUNT),
    ("pre_details_delay_ms", 1),
    ("padding", PADDING_SIZE),
];

/// Wire layout of [`PackedSensorSettings`].
pub const SENSOR_SETTINGS_FIELDS: &[(&str, usize)] = &[
    ("load_cell_low_threshold", 1),
    ("load_cell_high_threshold", 1),
    ("fsr_low_threshold", SENSOR_COUNT),
    ("fsr_high_threshold", SENSOR_COUNT),
    ("combined_low_threshold", 2),
    ("combined_high_threshold", 2),
    ("reserved", 2),
];

/// Byte offset of `name` within a layout table.
pub fn layout_offset(fields: &[(&str, usize)], name: &str) -> Option<usize> {
    let mut offset = 0;
    for (field, width) in fields {
        if *field == name {
            return Some(offset);
        }
        offset += width;
    }
    None
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.offset];
        self.offset += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.bytes[self.offset], self.bytes[self.offset + 1]]);
        self.offset += 2;
        v
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn consumed(&self) -> usize {
        self.offset
    }
}

struct FieldWriter {
    bytes: Vec<u8>,
}

impl FieldWriter {
    fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.bytes.extend_from_slice(v);
    }

    fn finish(self) -> [u8; CONFIG_SIZE] {
        debug_assert_eq!(self.bytes.len(), CONFIG_SIZE);
        let mut out = [0u8; CONFIG_SIZE];
        out.copy_from_slice(&self.bytes);
        out
    }
}
