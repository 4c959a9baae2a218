use std::time::Duration;

use crate::error::{Error, Result};

/// Size of the container header prepended to raw PCM.
pub const WAV_HEADER_LEN: usize = 44;

/// A playable unit of decoded audio: raw little-endian PCM plus the format
/// the device needs to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub pcm: Vec<u8>,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioSegment {
    pub fn new(pcm: Vec<u8>, sample_rate_hz: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            pcm,
            sample_rate_hz,
            channels,
            bits_per_sample,
        }
    }

    /// The common case on this wire: mono 16-bit PCM.
    pub fn mono16(pcm: Vec<u8>, sample_rate_hz: u32) -> Self {
        Self::new(pcm, sample_rate_hz, 1, 16)
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Wall-clock length of this segment when played at its stated format.
    pub fn duration(&self) -> Duration {
        let byte_rate =
            self.sample_rate_hz as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.pcm.len() as u64 * 1_000_000 / byte_rate)
    }

    /// Wrap the PCM in a standard container so any file-based player can
    /// consume it.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        wav_container(
            &self.pcm,
            self.sample_rate_hz,
            self.channels,
            self.bits_per_sample,
        )
    }
}

/// Build the fixed 44-byte RIFF/WAVE header for a PCM body of `data_len`
/// bytes. All multi-byte fields are little-endian.
pub fn wav_header(
    sample_rate_hz: u32,
    channels: u16,
    bits_per_sample: u16,
    data_len: u32,
) -> [u8; WAV_HEADER_LEN] {
    let byte_rate = sample_rate_hz * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM format tag
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate_hz.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Prepend the container header to raw PCM. An empty body is rejected so a
/// zero-length file never reaches the playback device.
pub fn wav_container(
    pcm: &[u8],
    sample_rate_hz: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<Vec<u8>> {
    if pcm.is_empty() {
        return Err(Error::AudioDecode(
            "cannot build a container around an empty segment".to_string(),
        ));
    }

    let header = wav_header(sample_rate_hz, channels, bits_per_sample, pcm.len() as u32);
    let mut container = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    container.extend_from_slice(&header);
    container.extend_from_slice(pcm);
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_sit_at_documented_offsets() {
        let header = wav_header(24_000, 1, 16, 2_000);

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 2_036);
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(header[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(header[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(header[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(header[24..28].try_into().unwrap()),
            24_000
        );
        assert_eq!(
            u32::from_le_bytes(header[28..32].try_into().unwrap()),
            48_000
        );
        assert_eq!(u16::from_le_bytes(header[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(header[34..36].try_into().unwrap()), 16);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes(header[40..44].try_into().unwrap()), 2_000);
    }

    #[test]
    fn container_length_is_header_plus_body() {
        for n in [2usize, 320, 4_800] {
            let pcm = vec![0u8; n];
            let container = wav_container(&pcm, 24_000, 1, 16).unwrap();
            assert_eq!(container.len(), WAV_HEADER_LEN + n);
            assert_eq!(&container[WAV_HEADER_LEN..], &pcm[..]);
        }
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = wav_container(&[], 24_000, 1, 16).unwrap_err();
        assert!(matches!(err, Error::AudioDecode(_)));
    }

    #[test]
    fn duration_reflects_format() {
        // 1 second of mono 16-bit at 16 kHz is 32000 bytes.
        let segment = AudioSegment::mono16(vec![0u8; 32_000], 16_000);
        assert_eq!(segment.duration(), Duration::from_secs(1));
    }
}
