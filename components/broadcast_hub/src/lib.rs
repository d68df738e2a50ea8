//! Fan-out of dispatcher acks and poller states to live subscribers.
//!
//! One loop task owns the subscriber registry. Everything else talks to it
//! through channels: [`Hub::join`] and [`Hub::leave`] on the control side,
//! the dispatcher's ack queue and the poller's state queue on the input side.
//! Every subscriber has its own bounded mailbox so a stalled reader only
//! loses its own messages.

mod hub;
mod message;

pub use hub::{Hub, HubConfig, HubError, SubscriberId, Subscription, DEFAULT_MAILBOX_CAPACITY};
pub use message::{EventKind, HubMessage};
