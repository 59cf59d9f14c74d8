//! Wires `relay-dialog`'s `MediaBridgeHook` seam to `relay-media-bridge`,
//! so a Media Bridge task is spawned the moment a dialog reaches
//! ESTABLISHED, without either crate depending on the other (spec.md §9:
//! the sink-callback/hook fix for the original's global-singleton
//! anti-pattern, applied again at this seam — see `DialogManager`'s own
//! doc comment on `MediaBridgeHook`).

use relay_dialog::{DialogId, MediaBridgeHook};
use relay_media_bridge::{BridgeConfig, MediaBridge, Pipeline, Vad};
use relay_rtp::RtpEngine;
use std::sync::Arc;

/// Constructs a fresh `Vad` per dialog (VAD state is per-call) and shares
/// one `Pipeline` across every dialog (the external speech-to-speech
/// backend is stateless from this relay's point of view).
pub struct BridgeHook {
    pipeline: Arc<dyn Pipeline>,
    vad_factory: Box<dyn Fn() -> Box<dyn Vad> + Send + Sync>,
    config: BridgeConfig,
}

impl BridgeHook {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        vad_factory: impl Fn() -> Box<dyn Vad> + Send + Sync + 'static,
        config: BridgeConfig,
    ) -> Self {
        BridgeHook {
            pipeline,
            vad_factory: Box::new(vad_factory),
            config,
        }
    }
}

impl MediaBridgeHook for BridgeHook {
    fn on_established(&self, dialog_id: &DialogId, rtp: RtpEngine) {
        let payload_type = rtp.payload_type();
        let bridge = MediaBridge::new(
            rtp,
            (self.vad_factory)(),
            self.pipeline.clone(),
            payload_type,
            self.config,
        );
        let dialog_id = dialog_id.clone();
        tokio::spawn(async move {
            tracing::debug!("media bridge armed for {dialog_id}");
            bridge.run().await;
            tracing::debug!("media bridge for {dialog_id} exited");
        });
    }

    fn on_terminated(&self, dialog_id: &DialogId) {
        // The bridge task above exits on its own once `RtpEngine::shutdown`
        // closes the receive queue (spec.md §4.8's `run()` contract), which
        // `DialogManager` already calls before invoking this hook. Nothing
        // further to tear down here.
        tracing::debug!("dialog {dialog_id} terminated, media bridge will stop on its own");
    }
}
