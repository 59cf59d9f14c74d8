//! The two external collaborator interfaces the Media Bridge depends on.
//!
//! Grounded on REDESIGN FLAGS (spec.md §9): the original source models
//! `Speech2Text`/`LLM(backend=...)`/`Text2Speech` as a trio of concrete
//! classes, with the LLM backend itself chosen by a dynamic-dispatch base
//! class in `helper/llm_backends/llm_backend.py`. That whole trio collapses
//! to one `Pipeline` trait the bridge depends on without caring what's
//! behind it, matching the teacher's `async-trait`-at-a-seam style
//! (`rvoip-session-core`'s session event handlers).

use crate::error::PipelineError;

/// Reports whether a 20ms PCM frame contains speech. Stateful so an
/// implementation can smooth across frames; the bridge calls it once per
/// inbound RTP payload regardless of phase (spec.md §4.8).
pub trait Vad: Send + Sync {
    fn is_speech(&mut self, frame_pcm: &[i16]) -> bool;
}

/// One speech-to-speech turn: linear PCM in, linear PCM + detected language
/// out. Turn PCM is always 8kHz mono (spec.md glossary).
#[async_trait::async_trait]
pub trait Pipeline: Send + Sync {
    async fn infer(
        &self,
        turn_pcm: Vec<i16>,
        hint_lang: Option<String>,
    ) -> Result<(Vec<i16>, String), PipelineError>;
}
