//! Base64 helpers for raw linear PCM, standard alphabet, no line wrapping.

use crate::error::{CodecError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Encode raw PCM bytes as standard base64 (no wrapping).
pub fn encode_pcm_b64(pcm: &[u8]) -> String {
    STANDARD.encode(pcm)
}

/// Decode a standard base64 string back to raw PCM bytes.
pub fn decode_pcm_b64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let pcm: Vec<u8> = (0..=255u8).collect();
        let encoded = encode_pcm_b64(&pcm);
        assert_eq!(decode_pcm_b64(&encoded).unwrap(), pcm);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(decode_pcm_b64("not valid base64!!").is_err());
    }
}
