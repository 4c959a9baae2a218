use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as StateMutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::SessionEvent;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::audio::capture::{CaptureFrame, CaptureSource};
use crate::audio::pipeline::{CapturePipeline, FrameDisposition};
use crate::audio::playback::PlaybackQueue;
use crate::audio::segment::AudioSegment;
use crate::audio::store::SegmentStore;
use crate::device::Devices;
use crate::error::{Error, Result};
use crate::wire::frame::{self, Frame, DEFAULT_INBOUND_RATE_HZ};
use crate::wire::messages::{self, ServerMessage};
use crate::wire::transport::{MessageTransport, WsTransport};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Counters and state shared between the session handle and its driver task
struct Shared {
    state: StateMutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    started_at: DateTime<Utc>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_buffered: AtomicUsize,
    frames_evicted: AtomicU64,
    frames_dropped_muted: AtomicU64,
    transcripts: AtomicU64,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("Session state {} -> {}", *state, next);
            *state = next;
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

/// Requests from the session handle to the driver task
enum Command {
    SendAudio {
        pcm: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    SendText {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    AttachCapture(mpsc::Receiver<CaptureFrame>),
    DetachCapture,
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Why the driver loop ended
enum Teardown {
    Requested(Option<oneshot::Sender<()>>),
    Failed(Error),
    RemoteClosed,
}

/// A live bidirectional audio session with a conversational service.
///
/// One driver task owns the transport, the state machine, and the capture
/// pipeline; a playback worker drains the segment queue. The handle talks
/// to the driver over a command channel, so every public method is safe to
/// call from any task.
///
/// Dropping the handle without calling [`disconnect`](Self::disconnect)
/// still tears the connection down: the driver notices the closed command
/// channel and runs the same teardown path.
pub struct LiveSession {
    config: SessionConfig,
    shared: Arc<Shared>,
    devices: Devices,
    playback: PlaybackQueue,
    commands: mpsc::UnboundedSender<Command>,
    driver: Mutex<Option<JoinHandle<()>>>,
    capture_source: Mutex<Option<Box<dyn CaptureSource>>>,
    muted: Arc<AtomicBool>,
}

impl LiveSession {
    /// Dial the configured endpoint and perform the setup handshake.
    ///
    /// Returns as soon as setup is sent; the session is `AwaitingSetupAck`
    /// until the server acknowledges, and [`SessionEvent::Ready`] fires
    /// when it does.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let transport = WsTransport::connect(&config.url, &config.api_key).await?;
        Self::connect_with(config, Box::new(transport), Devices::default()).await
    }

    /// Like [`connect`](Self::connect), but over a caller-supplied
    /// transport and device set. This is the seam the tests drive.
    pub async fn connect_with(
        config: SessionConfig,
        mut transport: Box<dyn MessageTransport>,
        devices: Devices,
    ) -> Result<Self> {
        info!(
            "Starting session {} with model {}",
            config.session_id, config.model
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            state: StateMutex::new(SessionState::Connecting),
            events,
            started_at: Utc::now(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_buffered: AtomicUsize::new(0),
            frames_evicted: AtomicU64::new(0),
            frames_dropped_muted: AtomicU64::new(0),
            transcripts: AtomicU64::new(0),
        });

        // Setup is the first frame on the wire; no media may precede it.
        let setup = frame::encode_control(&messages::setup(&config.model))?;
        if let Err(e) = transport.send_text(setup).await {
            shared.set_state(SessionState::Disconnected);
            return Err(e);
        }
        shared.set_state(SessionState::AwaitingSetupAck);

        if let Err(e) = devices.routing.force_speaker_output(true).await {
            warn!("Speaker routing unavailable: {}", e);
        }

        let store = match SegmentStore::create(
            config.resolved_segment_dir(),
            config.keep_recent_segments,
        )
        .await
        {
            Ok(store) => Arc::new(store),
            Err(e) => {
                let _ = transport.close().await;
                shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };
        let playback = PlaybackQueue::start(
            store,
            devices.sink.clone(),
            devices.routing.clone(),
            config.sweep_interval(),
        );

        let pipeline = CapturePipeline::new(config.buffer_capacity);
        let muted = pipeline.mute_handle();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            shared: shared.clone(),
            transport,
            commands: command_rx,
            capture_rx: None,
            pipeline,
            playback: playback.clone(),
            capture_rate_hz: config.capture_sample_rate_hz,
        };
        let handle = tokio::spawn(driver.run());

        Ok(Self {
            config,
            shared,
            devices,
            playback,
            commands: command_tx,
            driver: Mutex::new(Some(handle)),
            capture_source: Mutex::new(None),
            muted,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Subscribe to session events. Each receiver sees every event emitted
    /// after it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Engage or release the mute gate. Takes effect on the next capture
    /// frame; a frame already handed to the wire is not recalled. Muted
    /// frames are discarded outright, never buffered.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        debug!("Mute set to {}", muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Pass-through to the platform's volume control.
    pub async fn set_output_volume(&self, volume: f32) -> Result<()> {
        self.devices.routing.set_output_volume(volume).await
    }

    /// Send one frame of capture PCM at the configured rate. Only valid
    /// while the session is `Active`; fails with `NotActive` otherwise.
    /// This bypasses the mute gate, which covers capture sources only.
    pub async fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SendAudio {
                pcm,
                reply: reply_tx,
            })
            .map_err(|_| Error::NotActive)?;
        reply_rx.await.map_err(|_| Error::NotActive)?
    }

    /// Send one user text turn, marked complete so the model replies.
    /// Only valid while the session is `Active`.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SendText {
                text: text.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| Error::NotActive)?;
        reply_rx.await.map_err(|_| Error::NotActive)?
    }

    /// Start streaming from a capture source. Asks for microphone
    /// permission first and fails with `PermissionDenied` if refused; the
    /// session itself keeps running receive-only in that case.
    ///
    /// Frames produced before the handshake ack are buffered (newest-ten)
    /// and flushed in order once the session goes active.
    pub async fn start_capture(&self, mut source: Box<dyn CaptureSource>) -> Result<()> {
        let mut slot = self.capture_source.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.is_capturing() {
                warn!("Capture already running");
                return Ok(());
            }
        }

        if !self.devices.permissions.request_microphone_access().await {
            warn!("Microphone permission denied, session stays receive-only");
            return Err(Error::PermissionDenied);
        }

        if let Err(e) = self.devices.routing.enable_echo_cancellation(true).await {
            warn!("Echo cancellation unavailable: {}", e);
        }

        let frames = source.start().await?;
        info!("Capture started ({})", source.name());

        if self.commands.send(Command::AttachCapture(frames)).is_err() {
            let _ = source.stop().await;
            return Err(Error::NotActive);
        }
        *slot = Some(source);
        Ok(())
    }

    /// Stop the capture source and drop whatever it had buffered for the
    /// handshake. Does nothing if capture is not running.
    pub async fn stop_capture(&self) -> Result<()> {
        let mut slot = self.capture_source.lock().await;
        let Some(mut source) = slot.take() else {
            return Ok(());
        };
        source.stop().await?;
        // The driver may already be gone during teardown.
        let _ = self.commands.send(Command::DetachCapture);
        info!("Capture stopped");
        Ok(())
    }

    /// Tear the session down: stop capture, close the transport, discard
    /// buffers, stop playback. Idempotent; returns the final counters.
    pub async fn disconnect(&self) -> SessionStats {
        {
            let mut slot = self.capture_source.lock().await;
            if let Some(mut source) = slot.take() {
                if let Err(e) = source.stop().await {
                    warn!("Capture source did not stop cleanly: {}", e);
                }
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Disconnect { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }

        {
            let mut driver = self.driver.lock().await;
            if let Some(task) = driver.take() {
                if let Err(e) = task.await {
                    error!("Session driver panicked: {}", e);
                }
            }
        }

        self.stats()
    }

    /// Current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.shared.started_at);
        SessionStats {
            state: self.shared.state(),
            started_at: self.shared.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.shared.frames_sent.load(Ordering::SeqCst),
            bytes_sent: self.shared.bytes_sent.load(Ordering::SeqCst),
            frames_buffered: self.shared.frames_buffered.load(Ordering::SeqCst),
            frames_evicted: self.shared.frames_evicted.load(Ordering::SeqCst),
            frames_dropped_muted: self.shared.frames_dropped_muted.load(Ordering::SeqCst),
            segments_enqueued: self.playback.enqueued(),
            segments_played: self.playback.played(),
            segments_pending: self.playback.pending(),
            transcripts_received: self.shared.transcripts.load(Ordering::SeqCst),
        }
    }
}

/// The task that owns the transport and runs the session state machine.
/// Everything mutable lives here; the handle only sends commands.
struct Driver {
    shared: Arc<Shared>,
    transport: Box<dyn MessageTransport>,
    commands: mpsc::UnboundedReceiver<Command>,
    capture_rx: Option<mpsc::Receiver<CaptureFrame>>,
    pipeline: CapturePipeline,
    playback: PlaybackQueue,
    capture_rate_hz: u32,
}

impl Driver {
    async fn run(mut self) {
        let reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(reason) = self.handle_command(command).await {
                            break reason;
                        }
                    }
                    // Every handle is gone; treat it as a disconnect.
                    None => break Teardown::Requested(None),
                },
                frame = next_capture(&mut self.capture_rx) => match frame {
                    Some(frame) => {
                        if let Some(reason) = self.on_capture_frame(frame).await {
                            break reason;
                        }
                    }
                    // Source finished on its own (fixture reached EOF).
                    None => self.capture_rx = None,
                },
                inbound = self.transport.next_frame() => match inbound {
                    Some(Ok(bytes)) => {
                        if let Some(reason) = self.on_inbound(&bytes).await {
                            break reason;
                        }
                    }
                    Some(Err(e)) => break Teardown::Failed(e),
                    None => break Teardown::RemoteClosed,
                },
            }
        };
        self.teardown(reason).await;
    }

    async fn handle_command(&mut self, command: Command) -> Option<Teardown> {
        match command {
            Command::SendAudio { pcm, reply } => {
                let result = if self.shared.state().is_active() {
                    self.send_pcm(&pcm, self.capture_rate_hz).await
                } else {
                    Err(Error::NotActive)
                };
                let teardown = match &result {
                    Err(e) if e.is_fatal() => Some(Teardown::Failed(e.clone())),
                    _ => None,
                };
                let _ = reply.send(result);
                teardown
            }
            Command::SendText { text, reply } => {
                let result = if self.shared.state().is_active() {
                    self.send_control(&messages::client_text(&text)).await
                } else {
                    Err(Error::NotActive)
                };
                let teardown = match &result {
                    Err(e) if e.is_fatal() => Some(Teardown::Failed(e.clone())),
                    _ => None,
                };
                let _ = reply.send(result);
                teardown
            }
            Command::AttachCapture(rx) => {
                self.capture_rx = Some(rx);
                None
            }
            Command::DetachCapture => {
                self.capture_rx = None;
                self.pipeline.clear();
                self.shared.frames_buffered.store(0, Ordering::SeqCst);
                None
            }
            Command::Disconnect { reply } => Some(Teardown::Requested(Some(reply))),
        }
    }

    async fn on_capture_frame(&mut self, frame: CaptureFrame) -> Option<Teardown> {
        let ready = self.shared.state().is_active();
        match self.pipeline.on_frame(frame, ready) {
            FrameDisposition::Transmit(frame) => {
                if let Err(e) = self.send_pcm(&frame.pcm, frame.sample_rate_hz).await {
                    if e.is_fatal() {
                        return Some(Teardown::Failed(e));
                    }
                    warn!("Dropping capture frame: {}", e);
                }
            }
            FrameDisposition::Buffered => {
                self.shared
                    .frames_buffered
                    .store(self.pipeline.buffered(), Ordering::SeqCst);
                self.shared
                    .frames_evicted
                    .store(self.pipeline.evicted(), Ordering::SeqCst);
            }
            FrameDisposition::DroppedMuted => {
                self.shared.frames_dropped_muted.fetch_add(1, Ordering::SeqCst);
            }
        }
        None
    }

    async fn on_inbound(&mut self, bytes: &[u8]) -> Option<Teardown> {
        match frame::classify(bytes) {
            // One bad frame never takes the session down.
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                None
            }
            Ok(Frame::MediaAudio { mime, data }) => {
                if self.shared.state().is_active() {
                    let rate =
                        frame::mime_sample_rate(&mime).unwrap_or(DEFAULT_INBOUND_RATE_HZ);
                    self.playback.enqueue(AudioSegment::mono16(data, rate));
                } else {
                    debug!("Dropping media frame in state {}", self.shared.state());
                }
                None
            }
            Ok(Frame::Control(doc)) => self.on_control(doc).await,
        }
    }

    async fn on_control(&mut self, doc: Value) -> Option<Teardown> {
        let message: ServerMessage = match serde_json::from_value(doc.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed control document: {}", e);
                return None;
            }
        };

        match self.shared.state() {
            SessionState::AwaitingSetupAck => {
                if message.setup_complete.is_some() {
                    info!("Setup acknowledged, session active");
                    self.shared.set_state(SessionState::Active);
                    self.shared.emit(SessionEvent::Ready);
                    return self.flush_buffered().await;
                }
                debug!("Ignoring control document before setup ack");
                None
            }
            SessionState::Active => self.on_active_control(&doc, message).await,
            other => {
                debug!("Dropping control document in state {}", other);
                None
            }
        }
    }

    /// Release everything the pipeline parked during the handshake, in
    /// arrival order, ahead of any new capture frames.
    async fn flush_buffered(&mut self) -> Option<Teardown> {
        let frames = self.pipeline.drain();
        let count = frames.len();
        for frame in frames {
            if let Err(e) = self.send_pcm(&frame.pcm, frame.sample_rate_hz).await {
                if e.is_fatal() {
                    return Some(Teardown::Failed(e));
                }
                warn!("Dropping buffered frame: {}", e);
            }
        }
        self.shared.frames_buffered.store(0, Ordering::SeqCst);
        if count > 0 {
            debug!("Flushed {} frames buffered during handshake", count);
        }
        None
    }

    async fn on_active_control(&mut self, doc: &Value, message: ServerMessage) -> Option<Teardown> {
        if message.setup_complete.is_some() {
            debug!("Ignoring duplicate setup ack");
        }

        if let Some(server_error) = message.error {
            warn!("Server reported error: {}", server_error.message);
            self.shared
                .emit(SessionEvent::ServerError(server_error.message));
        }

        if let Some(event) = message.event {
            if let Some(transcript) = event.transcript {
                self.shared.transcripts.fetch_add(1, Ordering::SeqCst);
                self.shared.emit(SessionEvent::Transcript {
                    text: transcript.text,
                    is_final: transcript.is_final,
                });
            }
            if event.turn_complete {
                self.shared.emit(SessionEvent::TurnComplete);
            }
        }

        if let Some(content) = message.server_content {
            if content.interrupted == Some(true) {
                // The server cancelled the model's turn; whatever is queued
                // belongs to that turn and must not play.
                let dropped = self.playback.clear();
                info!("Turn interrupted, dropped {} pending segments", dropped);
                self.shared.emit(SessionEvent::Interrupted);
            } else {
                match frame::extract_inline_audio(doc) {
                    Ok(Some(segment)) => self.playback.enqueue(segment),
                    Ok(None) => {}
                    Err(e) => warn!("Dropping inline audio: {}", e),
                }
                if let Some(turn) = content.model_turn {
                    for part in turn.parts {
                        if let Some(text) = part.text {
                            self.shared.emit(SessionEvent::ModelText(text));
                        }
                    }
                }
            }
            if content.turn_complete == Some(true) {
                self.shared.emit(SessionEvent::TurnComplete);
            }
        }

        None
    }

    async fn send_pcm(&mut self, pcm: &[u8], sample_rate_hz: u32) -> Result<()> {
        self.send_control(&messages::realtime_audio(pcm, sample_rate_hz))
            .await?;
        self.shared.frames_sent.fetch_add(1, Ordering::SeqCst);
        self.shared
            .bytes_sent
            .fetch_add(pcm.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn send_control<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let payload = frame::encode_control(message)?;
        self.transport.send_text(payload).await
    }

    async fn teardown(mut self, reason: Teardown) {
        let reply = match reason {
            Teardown::Requested(reply) => {
                info!("Disconnecting");
                self.shared.set_state(SessionState::Closing);
                reply
            }
            Teardown::Failed(e) => {
                error!("Transport failed: {}", e);
                self.shared.set_state(SessionState::Erroring);
                self.shared
                    .emit(SessionEvent::TransportError(e.to_string()));
                None
            }
            Teardown::RemoteClosed => {
                warn!("Server closed the connection");
                self.shared.set_state(SessionState::Erroring);
                self.shared.emit(SessionEvent::TransportError(
                    "connection closed by server".to_string(),
                ));
                None
            }
        };

        let _ = self.transport.close().await;
        self.capture_rx = None;
        self.pipeline.clear();
        self.shared.frames_buffered.store(0, Ordering::SeqCst);
        self.playback.shutdown().await;

        self.shared.set_state(SessionState::Disconnected);
        self.shared.emit(SessionEvent::Disconnected);
        info!("Session torn down");

        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }
}

/// Receive from an optional channel; pends forever while no capture source
/// is attached so the select loop ignores that arm.
async fn next_capture(rx: &mut Option<mpsc::Receiver<CaptureFrame>>) -> Option<CaptureFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
