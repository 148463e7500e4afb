use thiserror::Error;

/// Supervisor errors.
#[derive(Debug, Error)]
pub enum Error {
    /// `run` may only be called once per supervisor.
    #[error("supervisor has already been started")]
    AlreadyStarted,
}
