//! Command session over a report channel.
//!
//! A session owns the reader thread and serializes command/response cycles:
//! one command is on the wire at a time, responses are reassembled from the
//! report queue, and input-state events flow out on a broadcast channel
//! independently of any in-flight command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::framing::{encode_command, Assembled, CompletedCommand, PacketAssembler};
use crate::protocol::{cmd, device_info_request, is_ack, timing, RawReport, REPORT_SIZE};
use crate::reader::run_report_reader;
use crate::types::StageEvent;
use crate::ReportChannel;

/// What a command cycle is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitFor {
    /// A completed, non-broadcast response payload.
    Payload,
    /// The acknowledgement pattern, or a completed payload if the firmware
    /// answers with one anyway.
    AckOrPayload,
    /// A completed payload carrying the device-info broadcast flag.
    DeviceInfo,
}

struct SessionInner {
    reports: mpsc::Receiver<RawReport>,
    assembler: PacketAssembler,
}

impl SessionInner {
    /// Drop reports left over from an abandoned command.
    fn drain(&mut self) {
        let mut drained = 0usize;
        while self.reports.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!("drained {drained} stale reports before new command");
        }
        self.assembler.reset();
    }
}

/// An open command session with one stage.
pub struct StageSession {
    channel: Arc<dyn ReportChannel>,
    inner: tokio::sync::Mutex<SessionInner>,
    write_lock: parking_lot::Mutex<()>,
    events: broadcast::Sender<StageEvent>,
    shutdown: Arc<AtomicBool>,
    device_ready: AtomicBool,
}

impl StageSession {
    /// Start a session: configure the channel for blocking reads and spawn
    /// the reader thread.
    pub fn new(channel: Arc<dyn ReportChannel>) -> Result<Self, TransportError> {
        channel.set_blocking(true)?;

        let (report_tx, report_rx) = mpsc::channel(timing::REPORT_QUEUE_CAPACITY);
        let (events, _) = broadcast::channel(timing::INPUT_CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        {
            let channel = channel.clone();
            let events = events.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("smx-report-reader".into())
                .spawn(move || run_report_reader(channel, report_tx, events, shutdown))
                .map_err(|e| {
                    TransportError::Internal(format!("failed to spawn report reader: {e}"))
                })?;
        }

        Ok(Self {
            channel,
            inner: tokio::sync::Mutex::new(SessionInner {
                reports: report_rx,
                assembler: PacketAssembler::new(),
            }),
            write_lock: parking_lot::Mutex::new(()),
            events,
            shutdown,
            device_ready: AtomicBool::new(false),
        })
    }

    /// Send a command and wait for its complete response payload.
    pub async fn send_and_wait(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<CompletedCommand, TransportError> {
        debug!(
            "sending {} ({} bytes)",
            command.first().map(|&c| cmd::name(c)).unwrap_or("EMPTY"),
            command.len()
        );
        self.transact(encode_command(command), WaitFor::Payload, timeout)
            .await
    }

    /// Send a command that is answered with a bare acknowledgement.
    ///
    /// Completes on the acknowledgement report, or on a full payload should
    /// the firmware send one instead.
    pub async fn send_for_ack(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        debug!(
            "sending {} ({} bytes) for ack",
            command.first().map(|&c| cmd::name(c)).unwrap_or("EMPTY"),
            command.len()
        );
        self.transact(encode_command(command), WaitFor::AckOrPayload, timeout)
            .await?;
        Ok(())
    }

    /// Issue the raw device-info broadcast request and wait for the
    /// broadcast-flagged response payload.
    pub async fn request_device_info(
        &self,
        timeout: Duration,
    ) -> Result<CompletedCommand, TransportError> {
        debug!("requesting device info broadcast");
        self.transact(vec![device_info_request()], WaitFor::DeviceInfo, timeout)
            .await
    }

    async fn transact(
        &self,
        outgoing: Vec<RawReport>,
        wait: WaitFor,
        timeout: Duration,
    ) -> Result<CompletedCommand, TransportError> {
        let mut inner = self.inner.lock().await;
        inner.drain();
        let SessionInner { reports, assembler } = &mut *inner;

        let deadline = tokio::time::Instant::now() + timeout;
        {
            // All reports of one command go out back to back.
            let _write = self.write_lock.lock();
            for report in &outgoing {
                let written = self.channel.write_report(report)?;
                if written != REPORT_SIZE {
                    return Err(TransportError::ShortWrite {
                        written,
                        expected: REPORT_SIZE,
                    });
                }
            }
        }

        loop {
            let report = match tokio::time::timeout_at(deadline, reports.recv()).await {
                Ok(Some(report)) => report,
                Ok(None) => return Err(TransportError::Disconnected),
                Err(_) => {
                    warn!("command timed out after {timeout:?}");
                    assembler.reset();
                    return Err(TransportError::Timeout);
                }
            };

            if wait == WaitFor::AckOrPayload && is_ack(&report) {
                self.device_ready.store(true, Ordering::Relaxed);
                return Ok(CompletedCommand::acknowledgement());
            }

            match assembler.push(&report) {
                Assembled::Complete(completed) => {
                    if completed.host_cmd_finished {
                        self.device_ready.store(true, Ordering::Relaxed);
                    }
                    match wait {
                        WaitFor::DeviceInfo if !completed.device_info => {
                            debug!(
                                "discarding {}-byte payload while awaiting device info",
                                completed.payload.len()
                            );
                        }
                        WaitFor::Payload | WaitFor::AckOrPayload if completed.device_info => {
                            debug!(
                                "discarding unsolicited {}-byte device-info broadcast",
                                completed.payload.len()
                            );
                        }
                        _ => return Ok(completed),
                    }
                }
                Assembled::Incomplete | Assembled::Ignored => {}
            }
        }
    }

    /// Subscribe to asynchronous stage events (panel input changes).
    pub fn subscribe_events(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    /// Whether the stage has signalled it finished the last host command.
    pub fn device_ready(&self) -> bool {
        self.device_ready.load(Ordering::Relaxed)
    }

    /// The underlying report channel.
    pub fn channel(&self) -> &Arc<dyn ReportChannel> {
        &self.channel
    }
}

impl Drop for StageSession {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        debug!("session dropped, stopping report reader");
    }
}
