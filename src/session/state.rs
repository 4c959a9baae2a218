use serde::{Deserialize, Serialize};

/// Connection lifecycle of a live session.
///
/// ```text
/// Disconnected -> Connecting -> AwaitingSetupAck -> Active -> Closing -> Disconnected
///                      |                |              |
///                      +----------------+--------------+--> Erroring -> Disconnected
/// ```
///
/// `Erroring` and `Closing` are transient: the session always settles in
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection. The initial and final state.
    Disconnected,
    /// Dialing the endpoint.
    Connecting,
    /// Transport is open and the setup message is sent; waiting for the
    /// server's acknowledgement. Capture frames buffer in this state.
    AwaitingSetupAck,
    /// Handshake acknowledged. Media flows both ways.
    Active,
    /// A transport failure is being cleaned up.
    Erroring,
    /// A requested disconnect is being cleaned up.
    Closing,
}

impl SessionState {
    /// True once the handshake ack has arrived and media may be sent.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// True while a connection attempt or live connection exists.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::AwaitingSetupAck | SessionState::Active
        )
    }

    /// True while teardown is in progress.
    pub fn is_tearing_down(&self) -> bool {
        matches!(self, SessionState::Erroring | SessionState::Closing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingSetupAck => "awaiting_setup_ack",
            SessionState::Active => "active",
            SessionState::Erroring => "erroring",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}
