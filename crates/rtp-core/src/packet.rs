//! RFC 3550 §5.1 RTP header framing.
//!
//! Grounded on `crates/audio-core/src/rtp/mod.rs`'s `RtpPacket`/
//! `RtpPayloadHandler` bit layout, trimmed to the fixed 12-byte header (no
//! CSRC list, no header extension) spec.md §3 requires.

use crate::error::{Result, RtpError};

/// One RTP packet: a 12-byte fixed header plus payload (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Build a packet with version 2 and no padding/extension/CSRC, the only
    /// shape this relay ever emits.
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32, payload: Vec<u8>) -> Self {
        RtpPacket {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload,
        }
    }

    /// Serialize to wire bytes (RFC 3550 §5.1).
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.payload.len());
        let byte0 = (self.version << 6)
            | (u8::from(self.padding) << 5)
            | (u8::from(self.extension) << 4)
            | (self.csrc_count & 0x0F);
        out.push(byte0);
        let byte1 = (u8::from(self.marker) << 7) | (self.payload_type & 0x7F);
        out.push(byte1);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a wire datagram. Rejects anything shorter than the fixed
    /// 12-byte header or claiming a version other than 2 (spec.md §3).
    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(RtpError::MalformedPacket(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }
        let version = (data[0] >> 6) & 0x03;
        if version != 2 {
            return Err(RtpError::MalformedPacket(format!(
                "unsupported RTP version: {version}"
            )));
        }
        let padding = (data[0] & 0x20) != 0;
        let extension = (data[0] & 0x10) != 0;
        let csrc_count = data[0] & 0x0F;
        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let payload = data[12..].to_vec();

        Ok(RtpPacket {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unpack_rejects_short_packets() {
        assert!(RtpPacket::unpack(&[0u8; 11]).is_err());
    }

    #[test]
    fn unpack_rejects_non_v2() {
        let mut bytes = RtpPacket::new(8, 1, 160, 42, vec![0xD5; 160]).pack();
        bytes[0] = (1 << 6) | (bytes[0] & 0x3F);
        assert!(RtpPacket::unpack(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn round_trips_any_payload_length(len in 0usize..=1452) {
            let payload = vec![0xABu8; len];
            let packet = RtpPacket::new(8, 12345, 987654, 0xDEAD_BEEF, payload);
            let bytes = packet.pack();
            let parsed = RtpPacket::unpack(&bytes).unwrap();
            prop_assert_eq!(packet, parsed);
        }
    }
}
