//! Alert streams: broker sessions whose messages are routed by topic to
//! ordered lists of handlers.
//!
//! A [`Stream`] pairs one [`Broker`](alertstreams_broker::Broker) with a
//! [`TopicRoutes`] table. Once connected it consumes until told to stop or
//! until the session fails; reconnecting is left to the caller.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod handler;
mod routes;
mod stream;

pub use error::Error;
pub use handler::{Handler, HandlerError, HandlerRegistry};
pub use routes::{BoundHandler, Dispatch, TopicRoutes};
pub use stream::{Stream, StreamState};
