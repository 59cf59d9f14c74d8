//! The Media Bridge: couples an `RtpEngine`'s ingress/egress to an external
//! speech-to-speech `Pipeline` through a `Vad`-gated turn-taking phase
//! machine (spec.md §4.8).

pub mod bridge;
pub mod error;
pub mod null;
pub mod traits;

pub use bridge::{BridgeConfig, MediaBridge};
pub use error::{BridgeError, PipelineError, Result};
pub use null::{EnergyVad, NullPipeline};
pub use traits::{Pipeline, Vad};
