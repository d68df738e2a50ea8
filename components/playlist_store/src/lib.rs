//! Playlists kept in memory and mirrored to a JSON file.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("failed to read playlists from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write playlists to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playlist file {path} is not valid")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode playlists")]
    Encode(#[from] serde_json::Error),

    #[error("no movie {movie} in playlist {playlist}")]
    IndexOutOfRange { playlist: usize, movie: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub path: String,
}

impl Movie {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub movies: Vec<Movie>,
}

#[derive(Debug)]
pub struct PlaylistStore {
    path: PathBuf,
    playlists: RwLock<Vec<Playlist>>,
}

impl PlaylistStore {
    /// An empty store that will save to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            playlists: RwLock::new(Vec::new()),
        }
    }

    /// Read playlists from `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PlaylistError> {
        let path = path.into();

        let playlists = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| PlaylistError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No playlist file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(source) => return Err(PlaylistError::Read { path, source }),
        };

        Ok(Self {
            path,
            playlists: RwLock::new(playlists),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.playlists.read().clone()
    }

    pub fn replace(&self, playlists: Vec<Playlist>) {
        *self.playlists.write() = playlists;
    }

    pub fn movie(&self, playlist: usize, movie: usize) -> Result<Movie, PlaylistError> {
        self.playlists
            .read()
            .get(playlist)
            .and_then(|list| list.movies.get(movie))
            .cloned()
            .ok_or(PlaylistError::IndexOutOfRange { playlist, movie })
    }

    /// Write the current playlists. Goes through a temporary file so a crash
    /// never leaves a half-written playlist file behind.
    pub async fn save(&self) -> Result<(), PlaylistError> {
        let encoded = serde_json::to_vec_pretty(&*self.playlists.read())?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, &encoded)
            .await
            .map_err(|source| PlaylistError::Write {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| PlaylistError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!("Saved playlists to {}", self.path.display());
        Ok(())
    }
}
