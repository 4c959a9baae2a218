//! Live session management
//!
//! This module provides the `LiveSession` abstraction that manages:
//! - The WebSocket connection and setup handshake
//! - The session state machine
//! - Routing capture frames to the wire (with mute and handshake buffering)
//! - Routing server audio into the playback queue
//! - Session events and statistics

mod config;
mod events;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use events::SessionEvent;
pub use session::LiveSession;
pub use state::SessionState;
pub use stats::SessionStats;
