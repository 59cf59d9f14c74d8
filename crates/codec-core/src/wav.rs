//! Minimal RIFF/WAVE reader and writer for mono 8 kHz 16-bit PCM.
//!
//! Grounded on `original_source/helper/wav_handler.py` and
//! `RTPReceiver.save_wav`: always mono, 8000 Hz, 16-bit linear PCM,
//! uncompressed (format tag 1).

use crate::error::{CodecError, Result};

const FMT_PCM: u16 = 1;
const CHANNELS: u16 = 1;
const SAMPLE_RATE: u32 = 8000;
const BITS_PER_SAMPLE: u16 = 16;

/// Serialize raw 16-bit little-endian PCM samples into a RIFF/WAVE byte
/// buffer (mono, 8 kHz, 16-bit).
pub fn write_wav(pcm: &[u8]) -> Vec<u8> {
    let byte_rate = SAMPLE_RATE * CHANNELS as u32 * (BITS_PER_SAMPLE as u32 / 8);
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let data_len = pcm.len() as u32;
    let riff_len = 36 + data_len;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FMT_PCM.to_le_bytes());
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// Parsed WAV header fields, kept for callers that need to confirm format
/// before trusting the PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Parse a RIFF/WAVE buffer, returning its format and raw PCM data.
///
/// Only the canonical `fmt `/`data` chunk layout is accepted; anything else
/// (extended fmt chunks, non-PCM format tags) is `InvalidWav`.
pub fn read_wav(bytes: &[u8]) -> Result<(WavFormat, Vec<u8>)> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(CodecError::InvalidWav("missing RIFF/WAVE header".into()));
    }
    let mut offset = 12;
    let mut format: Option<WavFormat> = None;
    let mut data: Option<Vec<u8>> = None;

    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_len = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(chunk_len)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| CodecError::InvalidWav("chunk length overruns buffer".into()))?;

        match chunk_id {
            b"fmt " => {
                if chunk_len < 16 {
                    return Err(CodecError::InvalidWav("fmt chunk too short".into()));
                }
                let body = &bytes[body_start..body_end];
                let tag = u16::from_le_bytes([body[0], body[1]]);
                if tag != FMT_PCM {
                    return Err(CodecError::InvalidWav(format!("unsupported format tag {tag}")));
                }
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);
                format = Some(WavFormat {
                    channels,
                    sample_rate,
                    bits_per_sample,
                });
            }
            b"data" => {
                data = Some(bytes[body_start..body_end].to_vec());
            }
            _ => {}
        }

        // Chunks are word-aligned: a chunk with odd length is padded by one byte.
        offset = body_end + (chunk_len % 2);
    }

    let format = format.ok_or_else(|| CodecError::InvalidWav("missing fmt chunk".into()))?;
    let data = data.ok_or_else(|| CodecError::InvalidWav("missing data chunk".into()))?;
    Ok((format, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_pcm_and_format() {
        let pcm: Vec<u8> = (0..320u32).map(|i| (i % 256) as u8).collect();
        let wav = write_wav(&pcm);
        let (format, data) = read_wav(&wav).unwrap();
        assert_eq!(format.channels, 1);
        assert_eq!(format.sample_rate, 8000);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(data, pcm);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        assert!(read_wav(&[0u8; 10]).is_err());
    }

    #[test]
    fn non_pcm_format_tag_is_rejected() {
        let mut wav = write_wav(&[0u8; 4]);
        // format tag lives at byte offset 20 (12 RIFF/WAVE + 8 chunk header).
        wav[20] = 3;
        wav[21] = 0;
        assert!(matches!(read_wav(&wav), Err(CodecError::InvalidWav(_))));
    }
}
