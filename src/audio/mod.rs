pub mod capture;
pub mod pipeline;
pub mod playback;
pub mod segment;
pub mod store;

pub use capture::{CaptureFrame, CaptureSource, WavFileSource};
pub use pipeline::{CapturePipeline, FrameDisposition, RecordingBuffer};
pub use playback::PlaybackQueue;
pub use segment::{wav_container, wav_header, AudioSegment, WAV_HEADER_LEN};
pub use store::SegmentStore;
