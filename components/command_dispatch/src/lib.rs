//! Turns concurrent command submissions into one ordered stream toward the
//! player.
//!
//! HTTP handlers call [`Dispatcher::admit`]; a single worker task sends the
//! queued commands one at a time and publishes one [`relay_protocol::Ack`]
//! per command on the outbound queue.

mod allocator;
mod dispatcher;
mod error;

pub use allocator::CommandIdAllocator;
pub use dispatcher::{Dispatcher, DispatcherConfig, SpawnedDispatcher, DEFAULT_QUEUE_CAPACITY};
pub use error::DispatchError;
