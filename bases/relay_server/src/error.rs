use playlist_store::PlaylistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind HTTP listener on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server stopped unexpectedly")]
    Serve(#[source] std::io::Error),

    #[error("failed to load playlists")]
    Playlists(#[from] PlaylistError),
}

impl ServerError {
    pub fn config(reason: impl Into<String>) -> Self {
        ServerError::Config(reason.into())
    }
}
