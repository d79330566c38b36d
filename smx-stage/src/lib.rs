//! High-level interface for StepManiaX dance stages
//!
//! This crate provides typed stage operations (identity, configuration,
//! calibration, lights, diagnostics, input events) on top of the report
//! transport.

pub mod config;
pub mod device_info;
pub mod error;
pub mod inputs;
pub mod limit;
pub mod sensors;

pub use config::{
    config_flags, layout_offset, PackedSensorSettings, Rgb, StageConfig, CONFIG_FIELDS,
    CONFIG_SIZE, SENSOR_SETTINGS_FIELDS, SENSOR_SETTINGS_SIZE,
};
pub use device_info::{DeviceInfo, DEVICE_INFO_SIZE};
pub use error::StageError;
pub use inputs::{Panel, PanelInputs};
pub use limit::{Clock, MonotonicClock, WriteWindow};
pub use sensors::{PanelDiagnostics, SensorTestData, SensorTestMode, DETAIL_RECORD_SIZE};

// Re-exported for consumers that select and open stages themselves.
pub use smx_transport::{StageDescriptor, StageEvent, TransportError};

/// Number of pressure-sensing panels on a stage.
pub const PANEL_COUNT: usize = 9;

/// Sensor slots per panel.
pub const SENSOR_COUNT: usize = 4;

/// LEDs on the platform light strip.
pub const STRIP_LED_COUNT: usize = 44;

/// First firmware version with the 250-byte config record and the light
/// strip command.
pub const CONFIG_V5_FIRMWARE: u16 = 5;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use smx_transport::protocol::{cmd, timing};
use smx_transport::{list_stages, open_stage, StageSession};

const COMMAND_TIMEOUT: Duration = Duration::from_millis(timing::COMMAND_TIMEOUT_MS);

/// High-level interface to one stage.
///
/// Opening an interface reads the device identity once; firmware-dependent
/// behavior (config record format, light strip support) keys off the cached
/// firmware version.
pub struct StageInterface {
    session: StageSession,
    descriptor: Option<StageDescriptor>,
    info: DeviceInfo,
    clock: Arc<dyn Clock>,
    write_window: Mutex<WriteWindow>,
}

impl StageInterface {
    /// Enumerate connected stages.
    pub fn list() -> Result<Vec<StageDescriptor>, StageError> {
        Ok(list_stages()?)
    }

    /// Open a discovered stage.
    pub async fn open(descriptor: &StageDescriptor) -> Result<Self, StageError> {
        let channel = open_stage(descriptor)?;
        let session = StageSession::new(Arc::new(channel))?;
        let mut interface = Self::attach(session).await?;
        interface.descriptor = Some(descriptor.clone());
        Ok(interface)
    }

    /// Open the first stage found.
    pub async fn open_any() -> Result<Self, StageError> {
        let stages = list_stages()?;
        let Some(descriptor) = stages.first() else {
            return Err(StageError::NotFound("no stages connected".into()));
        };
        Self::open(descriptor).await
    }

    /// Attach to an already-started session.
    pub async fn attach(session: StageSession) -> Result<Self, StageError> {
        Self::attach_with_clock(session, Arc::new(MonotonicClock)).await
    }

    /// Attach with an explicit time source for the config write window.
    pub async fn attach_with_clock(
        session: StageSession,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StageError> {
        let completed = session
            .send_and_wait(&[cmd::GET_DEVICE_INFO], COMMAND_TIMEOUT)
            .await?;
        let info = DeviceInfo::from_response(&completed.payload)?;
        info!(
            "stage {} (firmware {}, player {})",
            info.serial, info.firmware_version, info.player
        );
        Ok(Self {
            session,
            descriptor: None,
            info,
            clock,
            write_window: Mutex::new(WriteWindow::new(Duration::from_millis(
                timing::CONFIG_WRITE_INTERVAL_MS,
            ))),
        })
    }

    /// Descriptor this interface was opened from, if it was opened through
    /// discovery.
    pub fn descriptor(&self) -> Option<&StageDescriptor> {
        self.descriptor.as_ref()
    }

    /// Identity read when the interface was attached.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn firmware_version(&self) -> u16 {
        self.info.firmware_version
    }

    /// The underlying command session.
    pub fn session(&self) -> &StageSession {
        &self.session
    }

    // === Identity ===

    /// Re-query identity through the broadcast request path.
    ///
    /// The cached [`device_info`](Self::device_info) is unaffected.
    pub async fn refresh_device_info(&self) -> Result<DeviceInfo, StageError> {
        let completed = self.session.request_device_info(COMMAND_TIMEOUT).await?;
        DeviceInfo::from_response(&completed.payload)
    }

    // === Configuration ===

    fn config_read_opcode(&self) -> u8 {
        if self.info.firmware_version >= CONFIG_V5_FIRMWARE {
            cmd::GET_CONFIG_V5
        } else {
            cmd::GET_CONFIG
        }
    }

    /// Read the stage configuration.
    ///
    /// A response that cannot be decoded as a full record (including the
    /// short records pre-v5 firmware sends) falls back to
    /// [`StageConfig::default`] so callers always have a sane record to
    /// edit and write back.
    pub async fn config(&self) -> Result<StageConfig, StageError> {
        let opcode = self.config_read_opcode();
        let completed = self.session.send_and_wait(&[opcode], COMMAND_TIMEOUT).await?;
        match StageConfig::from_response(&completed.payload, opcode) {
            Ok(config) => Ok(config),
            Err(StageError::InvalidConfig(reason)) => {
                warn!("undecodable config response ({reason}), using defaults");
                Ok(StageConfig::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the stage configuration.
    ///
    /// Writes are spaced at least one write interval apart; a write landing
    /// inside the window fails with [`StageError::RateLimited`] before any
    /// report goes out.
    pub async fn write_config(&self, config: &StageConfig) -> Result<(), StageError> {
        if self.info.firmware_version < CONFIG_V5_FIRMWARE {
            return Err(StageError::NotSupported(format!(
                "config writes need firmware {CONFIG_V5_FIRMWARE}+, stage reports {}",
                self.info.firmware_version
            )));
        }
        self.claim_write_window()?;
        let mut command = Vec::with_capacity(1 + CONFIG_SIZE);
        command.push(cmd::WRITE_CONFIG_V5);
        command.extend_from_slice(&config.encode());
        Ok(self.session.send_for_ack(&command, COMMAND_TIMEOUT).await?)
    }

    fn claim_write_window(&self) -> Result<(), StageError> {
        self.write_window
            .lock()
            .try_claim(self.clock.now())
            .map_err(|retry_in| {
                debug!("config write rate limited for {}ms", retry_in.as_millis());
                StageError::RateLimited { retry_in }
            })
    }

    /// Restore firmware defaults and return the refreshed configuration.
    ///
    /// Newer firmware clears the light strip as part of the reset, so the
    /// strip color from the refreshed record is re-applied.
    pub async fn factory_reset(&self) -> Result<StageConfig, StageError> {
        self.session
            .send_for_ack(&[cmd::FACTORY_RESET], COMMAND_TIMEOUT)
            .await?;
        let config = self.config().await?;
        if self.info.firmware_version >= CONFIG_V5_FIRMWARE {
            self.set_light_strip(config.platform_strip_color).await?;
        }
        Ok(config)
    }

    // === Calibration and lights ===

    /// Throw away calibration state and re-tare every sensor.
    pub async fn force_recalibration(&self) -> Result<(), StageError> {
        Ok(self
            .session
            .send_for_ack(&[cmd::FORCE_RECALIBRATION], COMMAND_TIMEOUT)
            .await?)
    }

    /// Set the whole platform light strip to one color.
    pub async fn set_light_strip(&self, color: Rgb) -> Result<(), StageError> {
        let mut command = Vec::with_capacity(3 + STRIP_LED_COUNT * 3);
        command.push(cmd::SET_LIGHT_STRIP);
        command.push(0); // strip index
        command.push(STRIP_LED_COUNT as u8);
        for _ in 0..STRIP_LED_COUNT {
            command.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Ok(self.session.send_for_ack(&command, COMMAND_TIMEOUT).await?)
    }

    // === Diagnostics ===

    /// Request one sensor diagnostic frame.
    ///
    /// [`SensorTestMode::Off`] stops the stream and never yields a frame,
    /// so requesting a frame for it is an error.
    pub async fn sensor_test_data(&self, mode: SensorTestMode) -> Result<SensorTestData, StageError> {
        if mode == SensorTestMode::Off {
            return Err(StageError::InvalidParameter(
                "cannot request a frame for mode off".into(),
            ));
        }
        let completed = self
            .session
            .send_and_wait(&[cmd::GET_SENSOR_TEST_DATA, mode.wire()], COMMAND_TIMEOUT)
            .await?;
        SensorTestData::from_response(&completed.payload, mode)
    }

    // === Input events ===

    /// Subscribe to panel input events.
    pub fn subscribe_inputs(&self) -> broadcast::Receiver<StageEvent> {
        self.session.subscribe_events()
    }

    /// Wait for the next panel input snapshot.
    pub async fn next_inputs(&self, timeout: Duration) -> Result<PanelInputs, StageError> {
        let mut events = self.subscribe_inputs();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(StageEvent::InputState { mask })) => {
                    return Ok(PanelInputs::from_mask(mask))
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    debug!("input receiver lagged by {n} events");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(TransportError::Disconnected.into())
                }
                Err(_) => return Err(TransportError::Timeout.into()),
            }
        }
    }
}
