use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Point-in-time counters for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the session connected
    pub started_at: DateTime<Utc>,

    /// Seconds since connect
    pub duration_secs: f64,

    /// Capture frames transmitted to the server
    pub frames_sent: u64,

    /// PCM bytes transmitted (before Base64 expansion)
    pub bytes_sent: u64,

    /// Capture frames currently parked awaiting the handshake ack
    pub frames_buffered: usize,

    /// Buffered frames evicted to make room for newer audio
    pub frames_evicted: u64,

    /// Capture frames discarded by the mute gate
    pub frames_dropped_muted: u64,

    /// Playback segments accepted into the queue
    pub segments_enqueued: u64,

    /// Playback segments played to completion
    pub segments_played: u64,

    /// Playback segments waiting in the queue right now
    pub segments_pending: usize,

    /// Transcript events received
    pub transcripts_received: u64,
}
