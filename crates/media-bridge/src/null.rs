//! Trivial reference implementations of `Vad`/`Pipeline`, used by this
//! crate's own tests and available to integrators who want a no-op
//! pipeline to wire the bridge up against before plugging in a real one
//! (spec.md §4.8: "the crate ships only the trait definitions plus a
//! `NullPipeline`/`EnergyVad` trivial reference implementation").

use crate::error::PipelineError;
use crate::traits::{Pipeline, Vad};

/// Mean-absolute-amplitude threshold VAD. Not tuned for production use —
/// a real deployment supplies its own `Vad` (e.g. WebRTC VAD bindings).
pub struct EnergyVad {
    threshold: i32,
}

impl EnergyVad {
    pub fn new(threshold: i32) -> Self {
        EnergyVad { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        EnergyVad::new(400)
    }
}

impl Vad for EnergyVad {
    fn is_speech(&mut self, frame_pcm: &[i16]) -> bool {
        if frame_pcm.is_empty() {
            return false;
        }
        let sum: i64 = frame_pcm.iter().map(|&s| (s as i64).abs()).sum();
        let mean = sum / frame_pcm.len() as i64;
        mean > self.threshold as i64
    }
}

/// Echoes the turn back unchanged, tagged `"en"`. Lets the bridge's phase
/// machine be exercised without a real speech-to-speech backend.
#[derive(Default)]
pub struct NullPipeline;

#[async_trait::async_trait]
impl Pipeline for NullPipeline {
    async fn infer(
        &self,
        turn_pcm: Vec<i16>,
        hint_lang: Option<String>,
    ) -> Result<(Vec<i16>, String), PipelineError> {
        Ok((turn_pcm, hint_lang.unwrap_or_else(|| "en".to_string())))
    }
}
