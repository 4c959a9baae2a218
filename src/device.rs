use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Platform hook for microphone consent. Real devices prompt the user;
/// tests and headless demos answer immediately.
#[async_trait]
pub trait MicrophonePermissions: Send + Sync {
    /// True when capture may proceed.
    async fn request_microphone_access(&self) -> bool;
}

/// Output-path capabilities of the host platform. All three calls are
/// advisory: a failure downgrades the experience but never the session.
#[async_trait]
pub trait AudioRouting: Send + Sync {
    /// Route output to the loudspeaker instead of the earpiece.
    async fn force_speaker_output(&self, enabled: bool) -> Result<()>;

    /// Set output volume in the range 0.0 to 1.0.
    async fn set_output_volume(&self, volume: f32) -> Result<()>;

    /// Keep the speaker's output out of the microphone signal.
    async fn enable_echo_cancellation(&self, enabled: bool) -> Result<()>;
}

/// Plays one persisted container file at a time. The token interrupts an
/// in-flight segment when the server cancels the model's turn.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play the file to completion, or stop early when `cancel` fires.
    /// Early stop is not an error.
    async fn play(&self, container: &Path, cancel: CancellationToken) -> Result<()>;
}

/// Grants microphone access unconditionally.
pub struct AlwaysGranted;

#[async_trait]
impl MicrophonePermissions for AlwaysGranted {
    async fn request_microphone_access(&self) -> bool {
        true
    }
}

/// Denies microphone access unconditionally. Used to exercise the
/// receive-only path.
pub struct AlwaysDenied;

#[async_trait]
impl MicrophonePermissions for AlwaysDenied {
    async fn request_microphone_access(&self) -> bool {
        false
    }
}

/// Accepts every routing request without touching any hardware.
pub struct NoopRouting;

#[async_trait]
impl AudioRouting for NoopRouting {
    async fn force_speaker_output(&self, enabled: bool) -> Result<()> {
        debug!("Speaker output: {}", enabled);
        Ok(())
    }

    async fn set_output_volume(&self, volume: f32) -> Result<()> {
        debug!("Output volume: {:.2}", volume.clamp(0.0, 1.0));
        Ok(())
    }

    async fn enable_echo_cancellation(&self, enabled: bool) -> Result<()> {
        debug!("Echo cancellation: {}", enabled);
        Ok(())
    }
}

/// Sink that holds each segment for its wall-clock duration without making
/// sound. Keeps the queue's one-at-a-time pacing honest on machines with
/// no audio device.
pub struct NullSink;

#[async_trait]
impl PlaybackSink for NullSink {
    async fn play(&self, container: &Path, cancel: CancellationToken) -> Result<()> {
        let reader = hound::WavReader::open(container)
            .map_err(|e| Error::Playback(format!("unreadable container: {}", e)))?;
        let spec = reader.spec();
        let seconds = reader.duration() as f64 / spec.sample_rate.max(1) as f64;
        let length = Duration::from_secs_f64(seconds);

        debug!(
            "Playing {} ({} ms, silent sink)",
            container.display(),
            length.as_millis()
        );

        tokio::select! {
            _ = tokio::time::sleep(length) => {}
            _ = cancel.cancelled() => {
                debug!("Playback of {} interrupted", container.display());
            }
        }
        Ok(())
    }
}

/// The device-facing collaborators a session needs, bundled so callers can
/// swap any of them. Defaults suit tests and headless use.
#[derive(Clone)]
pub struct Devices {
    pub permissions: Arc<dyn MicrophonePermissions>,
    pub routing: Arc<dyn AudioRouting>,
    pub sink: Arc<dyn PlaybackSink>,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            permissions: Arc::new(AlwaysGranted),
            routing: Arc::new(NoopRouting),
            sink: Arc::new(NullSink),
        }
    }
}
