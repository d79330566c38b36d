//! Interface tests against a scripted channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use smx_stage::{
    Clock, DeviceInfo, Panel, Rgb, SensorTestMode, StageConfig, StageError, StageInterface,
    CONFIG_SIZE, DETAIL_RECORD_SIZE, PANEL_COUNT, STRIP_LED_COUNT,
};
use smx_transport::protocol::cmd;
use smx_transport::testing::{ack_report, input_report, response_reports, ScriptedChannel};
use smx_transport::StageSession;

struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl FakeClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

fn info_payload(player_wire: u8, firmware: u16) -> Vec<u8> {
    let mut p = vec![cmd::DEVICE_INFO_ECHO, 0, player_wire, 0];
    p.extend_from_slice(&[0xA7; 16]);
    p.extend_from_slice(&firmware.to_le_bytes());
    p.push(b'\n');
    p
}

fn config_response(opcode: u8, config: &StageConfig) -> Vec<u8> {
    let mut p = vec![opcode, CONFIG_SIZE as u8];
    p.extend_from_slice(&config.encode());
    p.push(b'\n');
    p
}

/// Script the identity exchange and attach an interface over the channel.
async fn attach(firmware: u16) -> (Arc<ScriptedChannel>, Arc<FakeClock>, StageInterface) {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_exchange(response_reports(&info_payload(0, firmware)));
    let clock = Arc::new(FakeClock::new());
    let session = StageSession::new(channel.clone()).unwrap();
    let interface = StageInterface::attach_with_clock(session, clock.clone())
        .await
        .unwrap();
    (channel, clock, interface)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_attach_reads_identity() {
    let (_, _, interface) = attach(5).await;
    let info = interface.device_info();
    assert_eq!(info.player, 1);
    assert_eq!(info.firmware_version, 5);
    assert_eq!(info.serial, "A7".repeat(16));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_round_trips_through_interface() {
    let (channel, _, interface) = attach(5).await;

    let mut expected = StageConfig::default();
    expected.debounce_delay_ms = 25;
    expected.platform_strip_color = Rgb::new(10, 20, 30);
    expected.panel_settings[2].fsr_low_threshold = [9, 9, 9, 9];
    expected.padding[0] = 0x42;
    channel.push_exchange(response_reports(&config_response(
        cmd::GET_CONFIG_V5,
        &expected,
    )));

    let config = interface.config().await.unwrap();
    assert_eq!(config, expected);

    // Firmware 5 reads use the v5 opcode.
    let written = channel.written();
    assert_eq!(written[1][3], cmd::GET_CONFIG_V5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_undecodable_config_falls_back_to_defaults() {
    let (channel, _, interface) = attach(5).await;

    // Declares 30 bytes but carries 4.
    let mut payload = vec![cmd::GET_CONFIG_V5, 30];
    payload.extend_from_slice(&[1, 2, 3, 4]);
    channel.push_exchange(response_reports(&payload));

    let config = interface.config().await.unwrap();
    assert_eq!(config, StageConfig::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_echo_is_an_error_not_a_fallback() {
    let (channel, _, interface) = attach(5).await;

    let response = config_response(cmd::GET_CONFIG, &StageConfig::default());
    channel.push_exchange(response_reports(&response));

    let err = interface.config().await.unwrap_err();
    assert!(matches!(err, StageError::UnexpectedResponse(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_config_sends_record_for_ack() {
    let (channel, _, interface) = attach(5).await;
    channel.push_exchange(vec![ack_report()]);

    let mut config = StageConfig::default();
    config.panel_rotation = 2;
    interface.write_config(&config).await.unwrap();

    // 'W' plus the record spans five reports; the first starts with the
    // opcode and the record's first bytes.
    let written = channel.written();
    assert_eq!(written.len(), 1 + 5);
    assert_eq!(written[1][3], cmd::WRITE_CONFIG_V5);
    assert_eq!(written[1][4], 0xFF); // master_version
    assert_eq!(written[1][5], 0x05); // config_version
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_config_rate_limited_without_io() {
    let (channel, clock, interface) = attach(5).await;
    channel.push_exchange(vec![ack_report()]);

    let config = StageConfig::default();
    interface.write_config(&config).await.unwrap();
    let writes_after_first = channel.write_count();

    // Half a second later the window is still closed; nothing is written.
    clock.advance(Duration::from_millis(500));
    let err = interface.write_config(&config).await.unwrap_err();
    match err {
        StageError::RateLimited { retry_in } => {
            assert_eq!(retry_in, Duration::from_millis(500));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(channel.write_count(), writes_after_first);

    // Once the window reopens the write goes through.
    clock.advance(Duration::from_millis(600));
    channel.push_exchange(vec![ack_report()]);
    interface.write_config(&config).await.unwrap();
    assert_eq!(channel.write_count(), writes_after_first + 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_legacy_firmware_reads_with_legacy_opcode() {
    let (channel, _, interface) = attach(4).await;

    // Legacy firmware answers with a short record the v5 codec rejects.
    let mut payload = vec![cmd::GET_CONFIG, 128];
    payload.extend_from_slice(&[0; 128]);
    payload.push(b'\n');
    channel.push_exchange(response_reports(&payload));

    let config = interface.config().await.unwrap();
    assert_eq!(config, StageConfig::default());
    assert_eq!(channel.written()[1][3], cmd::GET_CONFIG);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_legacy_firmware_rejects_config_writes() {
    let (channel, _, interface) = attach(4).await;
    let writes_after_attach = channel.write_count();

    let err = interface.write_config(&StageConfig::default()).await.unwrap_err();
    assert!(matches!(err, StageError::NotSupported(_)));
    assert_eq!(channel.write_count(), writes_after_attach);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_factory_reset_reapplies_strip_color() {
    let (channel, _, interface) = attach(5).await;

    let mut config = StageConfig::default();
    config.platform_strip_color = Rgb::new(10, 20, 30);
    channel.push_exchange(vec![ack_report()]); // factory reset
    channel.push_exchange(response_reports(&config_response(cmd::GET_CONFIG_V5, &config)));
    channel.push_exchange(vec![ack_report()]); // light strip

    let returned = interface.factory_reset().await.unwrap();
    assert_eq!(returned.platform_strip_color, Rgb::new(10, 20, 30));

    // Reports: attach, 'f', 'G', then the three-report strip command.
    let written = channel.written();
    assert_eq!(written.len(), 6);
    assert_eq!(written[1][3], cmd::FACTORY_RESET);
    assert_eq!(written[2][3], cmd::GET_CONFIG_V5);
    let strip = &written[3];
    assert_eq!(strip[3], cmd::SET_LIGHT_STRIP);
    assert_eq!(strip[4], 0);
    assert_eq!(strip[5], STRIP_LED_COUNT as u8);
    assert_eq!(&strip[6..9], &[10, 20, 30]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_factory_reset_on_legacy_firmware_skips_strip() {
    let (channel, _, interface) = attach(4).await;

    channel.push_exchange(vec![ack_report()]);
    let mut payload = vec![cmd::GET_CONFIG, 0];
    payload.push(b'\n');
    channel.push_exchange(response_reports(&payload));

    let returned = interface.factory_reset().await.unwrap();
    assert_eq!(returned, StageConfig::default());
    // attach + 'f' + 'g', no strip command.
    assert_eq!(channel.write_count(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_light_strip_frames_all_leds() {
    let (channel, _, interface) = attach(5).await;
    channel.push_exchange(vec![ack_report()]);

    interface.set_light_strip(Rgb::new(1, 2, 3)).await.unwrap();

    // 3 header bytes + 44 * 3 color bytes = 135, which spans three reports.
    let written = channel.written();
    assert_eq!(written.len(), 1 + 3);
    let total: usize = written[1..].iter().map(|r| r[2] as usize).sum();
    assert_eq!(total, 3 + STRIP_LED_COUNT * 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensor_test_data_round_trip() {
    let (channel, _, interface) = attach(5).await;

    // Build the interleaved frame: panel 7 present with known readings.
    let mut records = [[0u8; DETAIL_RECORD_SIZE]; PANEL_COUNT];
    records[7][0] = 0b010; // signature
    records[7][1..3].copy_from_slice(&321i16.to_le_bytes());
    records[7][9] = 0x03; // DIP switch
    let raw = interleave(&records);
    let mut payload = vec![
        cmd::GET_SENSOR_TEST_DATA,
        SensorTestMode::CalibratedValues.wire(),
        raw.len() as u8,
    ];
    payload.extend_from_slice(&raw);
    channel.push_exchange(response_reports(&payload));

    let data = interface
        .sensor_test_data(SensorTestMode::CalibratedValues)
        .await
        .unwrap();
    assert!(data.panels[7].present);
    assert_eq!(data.panels[7].sensors[0], 321);
    assert_eq!(data.panels[7].dip_switch, 3);
    assert!(!data.panels[0].present);

    // The request carries the opcode and the mode byte.
    let request = channel.written()[1];
    assert_eq!(request[2], 2);
    assert_eq!(request[3], cmd::GET_SENSOR_TEST_DATA);
    assert_eq!(request[4], SensorTestMode::CalibratedValues.wire());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensor_test_mode_off_is_rejected_without_io() {
    let (channel, _, interface) = attach(5).await;
    let writes_after_attach = channel.write_count();

    let err = interface.sensor_test_data(SensorTestMode::Off).await.unwrap_err();
    assert!(matches!(err, StageError::InvalidParameter(_)));
    assert_eq!(channel.write_count(), writes_after_attach);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_next_inputs_decodes_mask() {
    let (channel, _, interface) = attach(5).await;

    // next_inputs subscribes on its first poll, before the report appears.
    let (inputs, ()) = tokio::join!(interface.next_inputs(Duration::from_millis(500)), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        channel.push_readable(input_report(0b1_0000_0001));
    });
    let inputs = inputs.unwrap();
    assert!(inputs.pressed(Panel::DownLeft));
    assert!(inputs.pressed(Panel::UpRight));
    assert_eq!(inputs.pressed_panels().count(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_info_type_parses_fixture() {
    // Sanity check on the parser the interface uses at attach time.
    let info = DeviceInfo::from_response(&info_payload(1, 260)).unwrap();
    assert_eq!(info.player, 2);
    assert_eq!(info.firmware_version, 260);
}

/// Inverse of the stage's de-interleaving, for building fixtures.
fn interleave(records: &[[u8; DETAIL_RECORD_SIZE]; PANEL_COUNT]) -> Vec<u8> {
    let mut words = [0u16; DETAIL_RECORD_SIZE * 8];
    for (panel, record) in records.iter().enumerate() {
        for (i, byte) in record.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    words[i * 8 + bit] |= 1 << panel;
                }
            }
        }
    }
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
