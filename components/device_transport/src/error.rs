use std::time::Duration;
use thiserror::Error;

/// Reasons a player exchange did not get the command across.
///
/// These are logged, then folded into an undelivered `Ack`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to player at {address}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to player at {address} took longer than {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("failed to write command to player at {address}")]
    Write {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
