//! Handlers available to every stream configuration.
//!
//! - `log`: records every message it receives.
//! - `heartbeat`: decodes SCiMMA-style heartbeats and logs every N-th beat.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod heartbeat;
mod log;

pub use heartbeat::{Heartbeat, HeartbeatHandler};
pub use log::LogHandler;

use alertstreams_stream::{Error, HandlerRegistry};

/// Identifier of [`LogHandler`].
pub const LOG: &str = "log";

/// Identifier of [`HeartbeatHandler`].
pub const HEARTBEAT: &str = "heartbeat";

/// Registers the built-in handlers under their standard identifiers.
///
/// # Errors
///
/// Returns [`Error::DuplicateHandler`] if an identifier is already taken.
pub fn register_builtin_handlers(registry: &mut HandlerRegistry) -> Result<(), Error> {
    registry
        .register(LOG, LogHandler)?
        .register(HEARTBEAT, HeartbeatHandler::default())?;
    Ok(())
}
