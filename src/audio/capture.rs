use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One fixed-duration chunk of microphone PCM on its way to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    /// Little-endian 16-bit mono PCM.
    pub pcm: Vec<u8>,
    pub sample_rate_hz: u32,
    /// Monotone per-source counter, first frame is 0.
    pub sequence: u64,
}

/// Something that produces capture frames: a microphone on a real device,
/// a WAV fixture in tests and demos.
#[async_trait]
pub trait CaptureSource: Send {
    /// Begin producing frames. Returns the channel the frames arrive on.
    /// Fails with `DeviceUnavailable` when the source cannot be opened.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>>;

    /// Stop producing frames and release the device.
    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Capture source that replays a mono 16-bit WAV file as if it were a live
/// microphone, slicing it into fixed-duration frames at the file's native
/// sample rate. The last frame is padded with silence to keep every frame
/// the same length.
pub struct WavFileSource {
    path: PathBuf,
    frame_duration: Duration,
    /// When false, frames are emitted as fast as the consumer drains them.
    paced: bool,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>, frame_duration: Duration) -> Self {
        Self {
            path: path.into(),
            frame_duration,
            paced: true,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Disable real-time pacing. Tests use this to stream a whole fixture
    /// in milliseconds.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn load_pcm(&self) -> Result<(Vec<u8>, u32)> {
        let reader = WavReader::open(&self.path).map_err(|e| {
            Error::DeviceUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let spec = reader.spec();
        if spec.channels != 1 || spec.bits_per_sample != 16 {
            return Err(Error::DeviceUnavailable(format!(
                "fixture must be mono 16-bit PCM, got {} channels at {} bits",
                spec.channels, spec.bits_per_sample
            )));
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DeviceUnavailable(format!("failed to read samples: {}", e)))?;

        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        Ok((pcm, spec.sample_rate))
    }
}

#[async_trait]
impl CaptureSource for WavFileSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        if self.running.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable(
                "source is already capturing".to_string(),
            ));
        }

        let (pcm, sample_rate_hz) = self.load_pcm()?;

        // Samples per frame, times two bytes per sample.
        let frame_len =
            (sample_rate_hz as u64 * self.frame_duration.as_millis() as u64 / 1000) as usize * 2;
        if frame_len == 0 {
            return Err(Error::DeviceUnavailable(
                "frame duration too short for sample rate".to_string(),
            ));
        }

        info!(
            "Streaming {} as capture fixture: {} bytes of PCM at {} Hz, {} ms frames",
            self.path.display(),
            pcm.len(),
            sample_rate_hz,
            self.frame_duration.as_millis()
        );

        let (tx, rx) = mpsc::channel(100);
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let paced = self.paced;
        let frame_duration = self.frame_duration;

        self.task = Some(tokio::spawn(async move {
            let mut sequence: u64 = 0;
            for chunk in pcm.chunks(frame_len) {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let mut frame_pcm = chunk.to_vec();
                frame_pcm.resize(frame_len, 0);

                let frame = CaptureFrame {
                    pcm: frame_pcm,
                    sample_rate_hz,
                    sequence,
                };
                sequence += 1;

                if tx.send(frame).await.is_err() {
                    debug!("Capture receiver dropped, stopping fixture stream");
                    break;
                }

                if paced {
                    tokio::time::sleep(frame_duration).await;
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("Fixture stream finished after {} frames", sequence);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Capture task ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
