pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod session;
pub mod wire;

pub use audio::{
    AudioSegment, CaptureFrame, CapturePipeline, CaptureSource, PlaybackQueue, RecordingBuffer,
    SegmentStore, WavFileSource,
};
pub use config::Config;
pub use device::{
    AlwaysDenied, AlwaysGranted, AudioRouting, Devices, MicrophonePermissions, NoopRouting,
    NullSink, PlaybackSink,
};
pub use error::{Error, Result};
pub use session::{LiveSession, SessionConfig, SessionEvent, SessionState, SessionStats};
pub use wire::{Frame, MessageTransport, WsTransport};
