//! The per-dialog `LISTENING → CAPTURING → INFERRING → SPEAKING → LISTENING`
//! phase machine that couples an `RtpEngine` to a `Vad` and a `Pipeline`
//! (spec.md §4.8).
//!
//! Grounded on `crates/media-core/src/integration/rtp_bridge.rs`'s
//! bridge-between-RTP-and-media-session shape (a struct owning the
//! transport handle plus per-call state, driven by one task's receive
//! loop) and `original_source/helper/custom_sts_handler.py` for the
//! turn-cutting algorithm (endpoint silence + minimum speech length before
//! handing a buffer to the pipeline).

use crate::error::BridgeError;
use crate::traits::{Pipeline, Vad};
use relay_codec::g711::SAMPLES_PER_FRAME;
use relay_rtp::{PayloadType, RtpEngine, RtpPacket};
use std::sync::Arc;
use std::time::Duration;

/// One 20ms frame's worth of linear PCM samples.
const FRAME_SAMPLES: usize = SAMPLES_PER_FRAME;
const FRAME_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Listening,
    Capturing,
    Inferring,
    Speaking,
}

/// Turn-cutting and barge-in thresholds (spec.md §4.8's named defaults).
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Consecutive silence frames that end a capture (default 10 = 200ms).
    pub endpoint_silence_frames: usize,
    /// Minimum captured frames before an endpoint is honored (default
    /// 50 = 1s); shorter bursts are treated as noise, not a turn.
    pub minimum_speech_frames: usize,
    /// Consecutive speech frames during SPEAKING that trigger barge-in
    /// (default 2).
    pub barge_in_frames: usize,
    /// How long a pipeline turn may run before it's dropped (default 15s).
    pub pipeline_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            endpoint_silence_frames: 10,
            minimum_speech_frames: 50,
            barge_in_frames: 2,
            pipeline_timeout: Duration::from_secs(15),
        }
    }
}

/// One dialog's bridge between RTP and the external pipeline. `run()`
/// drives it to completion (the RTP engine shutting down); nothing else
/// needs to poll it.
pub struct MediaBridge {
    rtp: RtpEngine,
    vad: Box<dyn Vad>,
    pipeline: Arc<dyn Pipeline>,
    payload_type: PayloadType,
    config: BridgeConfig,
    phase: Phase,
    capture: Vec<i16>,
    pending_turn: Option<Vec<i16>>,
    pending_speech: Option<Vec<i16>>,
    silence_run: usize,
    speech_run: usize,
    hint_lang: Option<String>,
}

impl MediaBridge {
    pub fn new(
        rtp: RtpEngine,
        vad: Box<dyn Vad>,
        pipeline: Arc<dyn Pipeline>,
        payload_type: PayloadType,
        config: BridgeConfig,
    ) -> Self {
        MediaBridge {
            rtp,
            vad,
            pipeline,
            payload_type,
            config,
            phase: Phase::Listening,
            capture: Vec::new(),
            pending_turn: None,
            pending_speech: None,
            silence_run: 0,
            speech_run: 0,
            hint_lang: None,
        }
    }

    /// Drive the phase machine until the RTP engine shuts down.
    pub async fn run(mut self) {
        loop {
            let alive = match self.phase {
                Phase::Listening | Phase::Capturing => match self.rtp.recv().await {
                    Some(packet) => {
                        self.on_packet(&packet);
                        true
                    }
                    None => false,
                },
                Phase::Inferring => self.run_inferring().await,
                Phase::Speaking => self.run_speaking().await,
            };
            if !alive {
                break;
            }
        }
    }

    /// LISTENING/CAPTURING: decode, feed the VAD, and cut a turn once the
    /// endpoint condition is met (spec.md §4.8).
    fn on_packet(&mut self, packet: &RtpPacket) {
        let frame = bytes_to_i16(&self.payload_type.decode(&packet.payload));

        match self.phase {
            Phase::Listening => {
                if self.vad.is_speech(&frame) {
                    self.capture.clear();
                    self.capture.extend_from_slice(&frame);
                    self.silence_run = 0;
                    self.phase = Phase::Capturing;
                }
            }
            Phase::Capturing => {
                let speaking = self.vad.is_speech(&frame);
                self.capture.extend_from_slice(&frame);
                if speaking {
                    self.silence_run = 0;
                } else {
                    self.silence_run += 1;
                }

                let captured_frames = self.capture.len() / FRAME_SAMPLES;
                if self.silence_run >= self.config.endpoint_silence_frames
                    && captured_frames >= self.config.minimum_speech_frames
                {
                    self.pending_turn = Some(std::mem::take(&mut self.capture));
                    self.phase = Phase::Inferring;
                }
            }
            Phase::Inferring | Phase::Speaking => {
                unreachable!("on_packet is only driven during LISTENING/CAPTURING")
            }
        }
    }

    /// INFERRING: at most one pipeline call in flight; inbound packets keep
    /// feeding the VAD for barge-in awareness but are not captured
    /// (spec.md §4.8). Returns `false` once the RTP engine has shut down.
    async fn run_inferring(&mut self) -> bool {
        let turn_pcm = self.pending_turn.take().unwrap_or_default();
        let hint_lang = self.hint_lang.clone();
        let pipeline = self.pipeline.clone();
        let infer_fut = tokio::time::timeout(
            self.config.pipeline_timeout,
            pipeline.infer(turn_pcm, hint_lang),
        );
        tokio::pin!(infer_fut);

        loop {
            tokio::select! {
                result = &mut infer_fut => {
                    self.finish_inference(result);
                    return true;
                }
                packet = self.rtp.recv() => {
                    let Some(packet) = packet else { return false };
                    let frame = bytes_to_i16(&self.payload_type.decode(&packet.payload));
                    self.vad.is_speech(&frame);
                }
            }
        }
    }

    fn finish_inference(
        &mut self,
        result: Result<Result<(Vec<i16>, String), crate::error::PipelineError>, tokio::time::error::Elapsed>,
    ) {
        match result {
            Ok(Ok((pcm, lang))) => {
                self.hint_lang = Some(lang);
                self.pending_speech = Some(pcm);
                self.phase = Phase::Speaking;
            }
            Ok(Err(e)) => {
                let err = BridgeError::from(e);
                tracing::warn!("pipeline turn failed, returning to listening: {err}");
                self.phase = Phase::Listening;
            }
            Err(_elapsed) => {
                tracing::warn!(
                    "pipeline turn exceeded {:?}, returning to listening",
                    self.config.pipeline_timeout
                );
                self.phase = Phase::Listening;
            }
        }
    }

    /// SPEAKING: enqueue the synthesized turn, then watch for barge-in
    /// while it plays out. Returns `false` once the RTP engine has shut
    /// down.
    async fn run_speaking(&mut self) -> bool {
        let pcm = self.pending_speech.take().unwrap_or_default();
        self.rtp.resume();

        let pcm_bytes = i16_to_le_bytes(&pcm);
        let frame_bytes = FRAME_SAMPLES * 2;
        let mut frame_count: u32 = 0;
        for chunk in pcm_bytes.chunks(frame_bytes) {
            self.rtp.enqueue_send(self.payload_type.encode(chunk)).await;
            frame_count += 1;
        }
        self.speech_run = 0;

        let playback_done = tokio::time::sleep(FRAME_DURATION * frame_count);
        tokio::pin!(playback_done);

        loop {
            tokio::select! {
                () = &mut playback_done => {
                    self.phase = Phase::Listening;
                    return true;
                }
                packet = self.rtp.recv() => {
                    let Some(packet) = packet else { return false };
                    let frame = bytes_to_i16(&self.payload_type.decode(&packet.payload));
                    if self.vad.is_speech(&frame) {
                        self.speech_run += 1;
                        if self.speech_run >= self.config.barge_in_frames {
                            self.rtp.pause();
                            self.capture.clear();
                            self.capture.extend_from_slice(&frame);
                            self.silence_run = 0;
                            self.phase = Phase::Capturing;
                            return true;
                        }
                    } else {
                        self.speech_run = 0;
                    }
                }
            }
        }
    }
}

fn bytes_to_i16(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

fn i16_to_le_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{EnergyVad, NullPipeline};

    async fn test_bridge() -> MediaBridge {
        let rtp = RtpEngine::bind(
            "127.0.0.1:0".parse().unwrap(),
            None,
            PayloadType::Pcma,
            10,
            10,
            None,
        )
        .await
        .unwrap();
        MediaBridge::new(
            rtp,
            Box::new(EnergyVad::new(400)),
            Arc::new(NullPipeline),
            PayloadType::Pcma,
            BridgeConfig::default(),
        )
    }

    fn packet_from_pcm(pcm: &[i16], payload_type: PayloadType) -> RtpPacket {
        let bytes = i16_to_le_bytes(pcm);
        let payload = payload_type.encode(&bytes);
        RtpPacket::new(payload_type.pt_byte(), 1, 160, 0x1234, payload)
    }

    fn silence_packet() -> RtpPacket {
        packet_from_pcm(&[0i16; FRAME_SAMPLES], PayloadType::Pcma)
    }

    fn speech_packet() -> RtpPacket {
        packet_from_pcm(&[5000i16; FRAME_SAMPLES], PayloadType::Pcma)
    }

    #[tokio::test]
    async fn silence_keeps_listening() {
        let mut bridge = test_bridge().await;
        bridge.on_packet(&silence_packet());
        assert_eq!(bridge.phase, Phase::Listening);
        assert!(bridge.capture.is_empty());
    }

    #[tokio::test]
    async fn first_speech_frame_starts_capturing() {
        let mut bridge = test_bridge().await;
        bridge.on_packet(&speech_packet());
        assert_eq!(bridge.phase, Phase::Capturing);
        assert_eq!(bridge.capture.len(), FRAME_SAMPLES);
    }

    #[tokio::test]
    async fn endpoint_not_honored_below_minimum_speech_frames() {
        let mut bridge = test_bridge().await;
        bridge.on_packet(&speech_packet());
        for _ in 0..bridge.config.endpoint_silence_frames {
            bridge.on_packet(&silence_packet());
        }
        // Only 1 speech frame captured, far below the 50-frame minimum.
        assert_eq!(bridge.phase, Phase::Capturing);
    }

    #[tokio::test]
    async fn endpoint_honored_once_minimum_speech_and_silence_are_met() {
        let mut bridge = test_bridge().await;
        for _ in 0..bridge.config.minimum_speech_frames {
            bridge.on_packet(&speech_packet());
        }
        for _ in 0..bridge.config.endpoint_silence_frames {
            bridge.on_packet(&silence_packet());
        }
        assert_eq!(bridge.phase, Phase::Inferring);
        assert!(bridge.pending_turn.is_some());
        assert!(bridge.capture.is_empty());
    }
}
