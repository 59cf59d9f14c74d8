//! G.711 PCMA/PCMU codec, WAV framing, and base64 helpers for the relay.

pub mod b64;
pub mod error;
pub mod g711;
pub mod wav;

pub use error::{CodecError, Result};
