//! The Call Supervisor: translates control-channel commands to dialog
//! operations and back (spec.md §4.9).

pub mod error;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use supervisor::CallSupervisor;
