use thiserror::Error;

/// Errors produced by the streaming client.
///
/// Variants differ in blast radius: `Transport` forces the whole session
/// down, while decode, playback, and storage failures are absorbed at the
/// frame or segment that caused them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection-level failure while dialing, sending, or receiving.
    /// Drives the session through `Erroring` into `Disconnected`.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame classified as control but did not parse as JSON.
    /// The frame is dropped; the session keeps running.
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Invalid Base64 audio payload or a segment with an empty body.
    #[error("audio decode error: {0}")]
    AudioDecode(String),

    /// The playback device rejected a segment. The queue advances past it.
    #[error("playback error: {0}")]
    Playback(String),

    /// Persisting or releasing a transient segment file failed.
    #[error("segment storage error: {0}")]
    Storage(String),

    /// Microphone access was refused by the platform.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The capture device could not be opened.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Send was attempted while the session was not in the `Active` state.
    #[error("session is not active")]
    NotActive,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure invalidates the connection rather than a
    /// single frame or segment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
