//! `RelayConfig`: the single struct `main` constructs to wire up every
//! layer (spec.md §1.1's ambient config concern). No environment variable
//! or CLI-flag loading lives here — explicitly out of scope per spec.md §1;
//! callers (tests, `main`, or an embedder) build this by hand.

use relay_dialog::DialogManagerConfig;
use relay_media_bridge::BridgeConfig;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub dialog: DialogManagerConfig,
    pub control: relay_control::ControlChannelConfig,
    pub bridge: BridgeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            dialog: DialogManagerConfig::default(),
            control: relay_control::ControlChannelConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}
