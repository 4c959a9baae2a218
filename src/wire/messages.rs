use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First message on every connection: declares the model before any media
/// may flow. The server answers with `setupComplete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setup {
    pub model: String,
}

/// Streaming media input. Audio travels Base64-encoded inside this control
/// document rather than as a raw binary frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeInputMessage {
    #[serde(rename = "realtimeInput")]
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub audio: AudioBlob,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded little-endian 16-bit PCM.
    pub data: String,
}

/// A discrete user turn, as opposed to streaming media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContentMessage {
    #[serde(rename = "clientContent")]
    pub client_content: ClientContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    #[serde(rename = "turnComplete")]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Everything the server may put in one control document. All sections are
/// optional; unknown sections are ignored so protocol additions do not break
/// older clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "setupComplete")]
    pub setup_complete: Option<Value>,
    #[serde(rename = "serverContent")]
    pub server_content: Option<ServerContent>,
    pub event: Option<ServerEvent>,
    pub error: Option<ServerError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerContent {
    #[serde(rename = "modelTurn")]
    pub model_turn: Option<ModelTurn>,
    pub interrupted: Option<bool>,
    #[serde(rename = "turnComplete")]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    pub text: Option<String>,
    #[serde(rename = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerEvent {
    pub transcript: Option<Transcript>,
    #[serde(rename = "turnComplete", default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}

/// Build the handshake message for a model identifier.
pub fn setup(model: &str) -> SetupMessage {
    SetupMessage {
        setup: Setup {
            model: model.to_string(),
        },
    }
}

/// Wrap one PCM frame for transmission. The mime type carries the sample
/// rate so the server never has to guess it.
pub fn realtime_audio(pcm: &[u8], sample_rate_hz: u32) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: AudioBlob {
                mime_type: format!("audio/pcm;rate={}", sample_rate_hz),
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
            },
        },
    }
}

/// Wrap one user text turn, marking the turn complete so the model replies
/// immediately.
pub fn client_text(text: &str) -> ClientContentMessage {
    ClientContentMessage {
        client_content: ClientContent {
            turns: vec![Turn {
                role: "USER".to_string(),
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            }],
            turn_complete: true,
        },
    }
}
