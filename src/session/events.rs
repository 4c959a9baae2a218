/// Everything a session reports to its subscribers. Delivered over a
/// broadcast channel so any number of consumers can listen; a consumer that
/// falls too far behind loses the oldest events, never the newest.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server acknowledged setup; the session is now active.
    Ready,
    /// A speech transcript, interim or final.
    Transcript { text: String, is_final: bool },
    /// Text content of the model's turn.
    ModelText(String),
    /// The model finished its turn.
    TurnComplete,
    /// The server cut the model's turn short. Pending playback was
    /// discarded when this fired.
    Interrupted,
    /// An error document from the server. Does not end the session.
    ServerError(String),
    /// The connection failed. Teardown follows.
    TransportError(String),
    /// Teardown finished; the session is gone.
    Disconnected,
}
