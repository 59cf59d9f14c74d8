//! Binary entry point: assembles the Control Channel, Dialog Manager, and
//! Call Supervisor, and runs them until Ctrl-C (spec.md §2's data-flow
//! diagram, realized as one `main`).

mod bridge_hook;
mod config;
mod logging;

use bridge_hook::BridgeHook;
use config::RelayConfig;
use relay_call_engine::CallSupervisor;
use relay_control::ControlChannel;
use relay_dialog::DialogManager;
use relay_media_bridge::{EnergyVad, NullPipeline};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::setup_logging(logging::LoggingConfig::default());
    logging::log_welcome("relay", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::default();

    // The speech recognizer/LLM/synthesizer pipeline and the VAD
    // implementation are external collaborators (spec.md §1, Non-goals);
    // this binary wires up the trivial reference implementations so the
    // relay runs standalone. An embedder swaps these for real ones.
    let pipeline = Arc::new(NullPipeline);
    let hook = Arc::new(BridgeHook::new(
        pipeline,
        || Box::new(EnergyVad::default()),
        config.bridge,
    ));

    let control = ControlChannel::new(config.control);
    let inbound = control
        .take_inbound()
        .await
        .expect("inbound queue is taken exactly once, at startup");

    let dialogs = DialogManager::bind(config.dialog, control.sink(), hook).await?;

    let supervisor = CallSupervisor::new(dialogs.clone(), inbound);

    let control_task = tokio::spawn(control.clone().run());
    let dialog_task = tokio::spawn(dialogs.clone().run());
    let supervisor_task = tokio::spawn(supervisor.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping the relay");
    dialogs.shutdown();

    control_task.abort();
    let _ = dialog_task.await;
    supervisor_task.abort();

    Ok(())
}
