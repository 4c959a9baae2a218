use anyhow::Result;
use serde::Deserialize;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate_hz: u32,
    pub frame_duration_ms: u64,
    pub buffer_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    pub keep_recent_segments: usize,
    pub sweep_interval_secs: u64,
    pub segment_dir: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session settings derived from the loaded file. A fresh session id is
    /// minted on every call.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.connection.url.clone(),
            api_key: self.connection.api_key.clone(),
            model: self.connection.model.clone(),
            capture_sample_rate_hz: self.audio.capture_sample_rate_hz,
            buffer_capacity: self.audio.buffer_capacity,
            segment_dir: self.playback.segment_dir.clone().map(Into::into),
            keep_recent_segments: self.playback.keep_recent_segments,
            sweep_interval_secs: self.playback.sweep_interval_secs,
            ..SessionConfig::default()
        }
    }
}
