//! Errors raised by the Call Supervisor (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Dialog(#[from] relay_dialog::DialogError),
}
