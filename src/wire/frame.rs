use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::audio::segment::AudioSegment;
use crate::error::{Error, Result};

/// Sample rate assumed for inbound audio that carries no rate hint, both
/// raw binary frames and inline data whose mime type omits `rate=`.
pub const DEFAULT_INBOUND_RATE_HZ: u32 = 24_000;

/// How many leading bytes the classifier inspects.
const CLASSIFY_WINDOW: usize = 20;

/// Minimum printable-ASCII ratio for a frame to be treated as control.
const PRINTABLE_THRESHOLD: f32 = 0.7;

/// One unit of traffic on the wire, after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A parsed JSON document: handshake, events, content, errors.
    Control(Value),
    /// Raw audio bytes. The mime hint is synthesized for inbound binary
    /// frames, which carry no metadata of their own.
    MediaAudio { mime: String, data: Vec<u8> },
}

impl Frame {
    /// Build an outbound media frame with a rate hint. On this wire audio
    /// normally leaves inside a `realtimeInput` control document instead,
    /// so this is the escape hatch for raw-binary peers.
    pub fn media_audio(pcm: Vec<u8>, sample_rate_hz: u32) -> Frame {
        Frame::MediaAudio {
            mime: format!("audio/pcm;rate={}", sample_rate_hz),
            data: pcm,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Control(_))
    }
}

/// Serialize a control message to its wire form.
pub fn encode_control<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| Error::ProtocolDecode(format!("failed to encode control message: {}", e)))
}

/// Decide whether inbound bytes are a control document or media audio.
///
/// A frame is control when its first byte opens a JSON document, or when at
/// least 70% of its first 20 bytes are printable ASCII. Anything that looks
/// like control but fails to parse is a decode error on that frame alone.
pub fn classify(bytes: &[u8]) -> Result<Frame> {
    if bytes.is_empty() {
        return Err(Error::ProtocolDecode("empty frame".to_string()));
    }

    if looks_like_control(bytes) {
        let doc: Value = serde_json::from_slice(bytes).map_err(|e| {
            Error::ProtocolDecode(format!("control frame is not valid JSON: {}", e))
        })?;
        Ok(Frame::Control(doc))
    } else {
        Ok(Frame::MediaAudio {
            mime: "audio/pcm".to_string(),
            data: bytes.to_vec(),
        })
    }
}

fn looks_like_control(bytes: &[u8]) -> bool {
    if matches!(bytes[0], b'{' | b'[') {
        return true;
    }
    let window = &bytes[..bytes.len().min(CLASSIFY_WINDOW)];
    let printable = window
        .iter()
        .filter(|b| (0x20..=0x7e).contains(*b))
        .count();
    printable as f32 / window.len() as f32 >= PRINTABLE_THRESHOLD
}

/// Pull the sample rate out of a mime type such as `audio/pcm;rate=24000`.
pub fn mime_sample_rate(mime: &str) -> Option<u32> {
    let start = mime.find("rate=")? + "rate=".len();
    let digits: String = mime[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Collect the inline audio carried by a server content document into one
/// playable segment.
///
/// Parts that share the first part's sample rate are concatenated in order;
/// a part at a different rate is skipped with a warning rather than
/// resampled. Returns `Ok(None)` when the document carries no audio.
pub fn extract_inline_audio(doc: &Value) -> Result<Option<AudioSegment>> {
    let Some(parts) = doc
        .pointer("/serverContent/modelTurn/parts")
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    let mut pcm = Vec::new();
    let mut rate: Option<u32> = None;

    for part in parts {
        let Some(inline) = part.get("inlineData") else {
            continue;
        };
        let mime = inline
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }

        let part_rate = mime_sample_rate(mime).unwrap_or(DEFAULT_INBOUND_RATE_HZ);
        match rate {
            None => rate = Some(part_rate),
            Some(first) if first != part_rate => {
                warn!(
                    "skipping inline audio part at {} Hz (segment is {} Hz)",
                    part_rate, first
                );
                continue;
            }
            Some(_) => {}
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::AudioDecode(format!("invalid base64 audio payload: {}", e)))?;
        pcm.extend_from_slice(&bytes);
    }

    match rate {
        Some(rate) if !pcm.is_empty() => Ok(Some(AudioSegment::mono16(pcm, rate))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_classifies_as_control() {
        let frame = classify(br#"{"setupComplete": {}}"#).unwrap();
        assert!(frame.is_control());
    }

    #[test]
    fn pcm_bytes_classify_as_media() {
        // Low-valued little-endian samples, nothing printable.
        let pcm: Vec<u8> = vec![0x00, 0x01, 0x02, 0x80, 0xff, 0x07, 0x00, 0x9c];
        match classify(&pcm).unwrap() {
            Frame::MediaAudio { data, .. } => assert_eq!(data, pcm),
            other => panic!("expected media frame, got {:?}", other),
        }
    }

    #[test]
    fn printable_ratio_at_threshold_is_control_shaped() {
        // 14 printable of 20 = 0.7, exactly at the threshold. Not JSON, so
        // classification succeeds but parsing fails on that frame alone.
        let mut bytes = vec![b'a'; 14];
        bytes.extend(std::iter::repeat(0x01u8).take(6));
        assert_eq!(bytes.len(), 20);
        let err = classify(&bytes).unwrap_err();
        assert!(matches!(err, Error::ProtocolDecode(_)));
    }

    #[test]
    fn printable_ratio_below_threshold_is_media() {
        let mut bytes = vec![b'a'; 13];
        bytes.extend(std::iter::repeat(0x01u8).take(7));
        assert_eq!(bytes.len(), 20);
        assert!(!classify(&bytes).unwrap().is_control());
    }

    #[test]
    fn mime_rate_parses_and_falls_back() {
        assert_eq!(mime_sample_rate("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(mime_sample_rate("audio/pcm;rate=16000;foo=bar"), Some(16_000));
        assert_eq!(mime_sample_rate("audio/pcm"), None);
        assert_eq!(mime_sample_rate("audio/pcm;rate="), None);
    }
}
