//! Errors raised by the Media Bridge and the external pipeline boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A pipeline turn did not return within its configured deadline
    /// (spec.md §5: 15s default). Contained within the bridge — it never
    /// terminates the call.
    #[error("pipeline turn timed out")]
    PipelineTimeout,

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Raised by a `Pipeline::infer` implementation. Opaque to the bridge;
/// carries only a message for logging (spec.md §7, §9).
#[derive(Error, Debug)]
#[error("pipeline inference failed: {0}")]
pub struct PipelineError(pub String);
