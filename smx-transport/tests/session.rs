//! Session tests against a scripted channel.

use std::sync::Arc;
use std::time::Duration;

use smx_transport::protocol::{cmd, flags, report_id};
use smx_transport::testing::{
    ack_report, broadcast_reports, input_report, response_reports, ScriptedChannel,
};
use smx_transport::{StageEvent, StageSession, TransportError};

const TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test(flavor = "multi_thread")]
async fn test_single_report_query() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_exchange(response_reports(b"G\x02ab"));
    let session = StageSession::new(channel.clone()).unwrap();

    let completed = session.send_and_wait(&[cmd::GET_CONFIG_V5], TIMEOUT).await.unwrap();
    assert_eq!(completed.payload, b"G\x02ab");
    assert!(!completed.device_info);

    // The request went out as one report with both framing flags.
    let written = channel.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0][0], report_id::COMMAND_OUT);
    assert_eq!(written[0][1], flags::START_OF_COMMAND | flags::END_OF_COMMAND);
    assert_eq!(written[0][2], 1);
    assert_eq!(written[0][3], cmd::GET_CONFIG_V5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_report_response_reassembled() {
    let channel = Arc::new(ScriptedChannel::new());
    let payload: Vec<u8> = (0..200u8).collect();
    channel.push_exchange(response_reports(&payload));
    let session = StageSession::new(channel.clone()).unwrap();

    let completed = session.send_and_wait(&[cmd::GET_CONFIG_V5], TIMEOUT).await.unwrap();
    assert_eq!(completed.payload, payload);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_long_command_split_across_reports() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_exchange(vec![ack_report()]);
    let session = StageSession::new(channel.clone()).unwrap();

    let command = vec![0x55u8; 122];
    session.send_for_ack(&command, TIMEOUT).await.unwrap();

    let written = channel.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0][1], flags::START_OF_COMMAND);
    assert_eq!(written[0][2], 61);
    assert_eq!(written[1][1], flags::END_OF_COMMAND);
    assert_eq!(written[1][2], 61);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ack_resolves_write_command() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_exchange(vec![ack_report()]);
    let session = StageSession::new(channel).unwrap();

    session.send_for_ack(&[cmd::FACTORY_RESET], TIMEOUT).await.unwrap();
    assert!(session.device_ready());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_leaves_session_usable() {
    let channel = Arc::new(ScriptedChannel::new());
    let session = StageSession::new(channel.clone()).unwrap();

    // No scripted response: the command must time out.
    let err = session
        .send_and_wait(&[cmd::GET_CONFIG_V5], Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout));

    // The session recovers for the next cycle.
    channel.push_exchange(response_reports(b"ok"));
    let completed = session.send_and_wait(&[cmd::GET_CONFIG_V5], TIMEOUT).await.unwrap();
    assert_eq!(completed.payload, b"ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsolicited_broadcast_skipped_while_waiting_for_payload() {
    let channel = Arc::new(ScriptedChannel::new());
    let mut responses = broadcast_reports(b"I_unsolicited");
    responses.extend(response_reports(b"wanted"));
    channel.push_exchange(responses);
    let session = StageSession::new(channel).unwrap();

    let completed = session.send_and_wait(&[cmd::GET_CONFIG_V5], TIMEOUT).await.unwrap();
    assert_eq!(completed.payload, b"wanted");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_device_info_waits_for_broadcast_flag() {
    let channel = Arc::new(ScriptedChannel::new());
    // A plain payload arrives first; only the flagged one answers the request.
    let mut responses = response_reports(b"not info");
    responses.extend(broadcast_reports(b"I\x00\x01"));
    channel.push_exchange(responses);
    let session = StageSession::new(channel.clone()).unwrap();

    let completed = session.request_device_info(TIMEOUT).await.unwrap();
    assert!(completed.device_info);
    assert_eq!(completed.payload, b"I\x00\x01");

    // The request is the bare broadcast-flag report, no start/end framing.
    let written = channel.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0][0], report_id::COMMAND_OUT);
    assert_eq!(written[0][1], flags::DEVICE_INFO);
    assert_eq!(written[0][2], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_input_reports_reach_subscribers_mid_command() {
    let channel = Arc::new(ScriptedChannel::new());
    let mut responses = vec![input_report(0x0041)];
    responses.extend(response_reports(b"payload"));
    channel.push_exchange(responses);
    let session = StageSession::new(channel).unwrap();
    let mut events = session.subscribe_events();

    let completed = session.send_and_wait(&[cmd::GET_CONFIG_V5], TIMEOUT).await.unwrap();
    assert_eq!(completed.payload, b"payload");

    let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, StageEvent::InputState { mask: 0x0041 });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_input_reports_flow_without_any_command() {
    let channel = Arc::new(ScriptedChannel::new());
    let session = StageSession::new(channel.clone()).unwrap();
    let mut events = session.subscribe_events();

    channel.push_readable(input_report(0x0100));
    channel.push_readable(input_report(0x0000));

    let first = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(first, StageEvent::InputState { mask: 0x0100 });
    assert_eq!(second, StageEvent::InputState { mask: 0x0000 });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_command_still_writes_a_report() {
    let channel = Arc::new(ScriptedChannel::new());
    channel.push_exchange(vec![ack_report()]);
    let session = StageSession::new(channel.clone()).unwrap();

    session.send_for_ack(&[], TIMEOUT).await.unwrap();

    let written = channel.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0][1], flags::START_OF_COMMAND | flags::END_OF_COMMAND);
    assert_eq!(written[0][2], 0);
}
