use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier, used for logging and the segment dir
    pub session_id: String,

    /// WebSocket endpoint of the conversational service
    pub url: String,

    /// API key, sent as a query parameter
    pub api_key: String,

    /// Model identifier declared in the setup handshake
    pub model: String,

    /// Sample rate of outbound capture audio (the mime hint on every
    /// transmitted frame)
    pub capture_sample_rate_hz: u32,

    /// How many capture frames to hold while the handshake is pending;
    /// oldest frames are dropped beyond this
    pub buffer_capacity: usize,

    /// Where transient playback segments are written. Defaults to a
    /// per-session directory under the system temp dir
    pub segment_dir: Option<PathBuf>,

    /// How many orphaned segment files the periodic sweep keeps
    pub keep_recent_segments: usize,

    /// Seconds between segment sweeps
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Resolved segment directory for this session.
    pub fn resolved_segment_dir(&self) -> PathBuf {
        match &self.segment_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join("voicewire").join(&self.session_id),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            api_key: String::new(),
            model: "models/gemini-2.0-flash-exp".to_string(),
            capture_sample_rate_hz: 16_000, // what the service expects from microphones
            buffer_capacity: 10,
            segment_dir: None,
            keep_recent_segments: 10,
            sweep_interval_secs: 30,
        }
    }
}
