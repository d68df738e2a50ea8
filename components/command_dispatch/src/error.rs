use relay_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("command rejected: {0}")]
    Rejected(#[from] ProtocolError),

    #[error("command dispatcher is no longer running")]
    WorkerGone,
}
