//! Error kinds shared by every component of the simulator (spec §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes the simulator can report. Every error is surfaced
/// synchronously at the call site that detected it; none escape from
/// inside a timer callback without being attributable to the code that
/// scheduled it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("already finalized: {0}")]
    AlreadyFinalized(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("handler already set: {0}")]
    HandlerAlreadySet(&'static str),

    #[error("admission failure: {0}")]
    AdmissionFailure(String),

    #[error("loader error: {0}")]
    LoaderError(String),
}

impl Error {
    /// Maps an error to the simulator driver's exit-code convention (spec §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AdmissionFailure(_) => 2,
            _ => 1,
        }
    }
}
