//! The Call Supervisor: the top-level orchestrator that translates
//! control-channel commands into `DialogManager` operations (spec.md
//! §4.9).
//!
//! Grounded on `crates/call-engine/src/orchestrator/core.rs`'s
//! `CallCenterEngine` (a struct that owns/wraps the session layer and
//! exposes a small set of operations the outside world calls), narrowed to
//! spec.md §4.9's two-command routing table — no agent registry, queueing,
//! routing engine or database, all of which are the teacher's call-center
//! product surface, not named anywhere in spec.md.

use crate::error::Result;
use relay_control::{AudioQueue, ControlCommand, ControlFrame};
use relay_dialog::DialogManager;
use std::sync::Arc;

/// Owns no state of its own beyond the handle to the Dialog Manager; the
/// Dialog Manager is the sole owner of the dialog table (spec.md §3's
/// "Ownership" rule).
pub struct CallSupervisor {
    dialogs: Arc<DialogManager>,
    inbound: Arc<AudioQueue<ControlFrame>>,
}

impl CallSupervisor {
    pub fn new(dialogs: Arc<DialogManager>, inbound: Arc<AudioQueue<ControlFrame>>) -> Self {
        CallSupervisor { dialogs, inbound }
    }

    /// Drain control-channel commands until the queue closes (the control
    /// channel shutting down).
    pub async fn run(self) {
        while let Some(frame) = self.inbound.pop().await {
            if let Err(e) = self.handle(frame).await {
                tracing::warn!("call supervisor failed to handle command: {e}");
            }
        }
        tracing::info!("call supervisor stopping: control channel closed");
    }

    async fn handle(&self, frame: ControlFrame) -> Result<()> {
        match frame.command {
            ControlCommand::Call => {
                let phone = frame.content.unwrap_or_default();
                let call_id = self.dialogs.originate_call(&phone).await?;
                tracing::info!("originated outbound call {call_id} to {phone}");
            }
            ControlCommand::Hangup => {
                self.dialogs.hangup().await?;
            }
            // CALL_ANS/CALL_IGNORE/RING_ANS/RING_IGNORE/BYE/CALL_FAILED are
            // either server -> UI events the UI might echo back, or purely
            // informational when sent by the UI; the server does not act
            // on them (spec.md §4.9). RTP frames from the UI are mirrored
            // media, not a control action, and are likewise not wired into
            // any dialog's send path here.
            other => {
                tracing::debug!("ignoring informational control command {other:?} from UI");
            }
        }
        Ok(())
    }
}
