//! Wire-level types shared by the relay components.
//!
//! A [`Command`] is what HTTP clients ask the player to do, an [`Ack`] is the
//! outcome of handing one to the player, and [`PlaybackState`] is the player's
//! self-reported state as collected by the poller.

mod command;
mod error;
mod state;

pub use command::{Ack, Command, CommandId, CommandRequest};
pub use error::ProtocolError;
pub use state::{PlaybackState, NO_SELECTION, STATE_QUERY};
