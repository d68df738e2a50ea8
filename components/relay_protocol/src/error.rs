use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("command name is empty")]
    EmptyCommand,

    #[error("player sent an empty reply")]
    EmptyReply,

    #[error("player reply is not a playback state: {0}")]
    MalformedState(#[from] serde_json::Error),
}
