mod error;
mod serialized;
mod tcp;

pub use error::TransportError;
pub use serialized::SerializedTransport;
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT, REPLY_BUFFER_SIZE};

use async_trait::async_trait;
use relay_protocol::{Ack, Command};
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for the player to answer a command
pub const DEFAULT_REPLY_DEADLINE: Duration = Duration::from_millis(50);

/// One-shot exchange with the player.
///
/// Implementations never fail: an unreachable player is an [`Ack`] with
/// `success == false`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, command: &Command, deadline: Duration) -> Ack;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, command: &Command, deadline: Duration) -> Ack {
        (**self).send(command, deadline).await
    }
}
