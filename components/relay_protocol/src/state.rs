use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Command the poller sends to ask the player for its state
pub const STATE_QUERY: &str = "playstate";

/// Index value meaning "nothing selected"
pub const NO_SELECTION: i64 = -1;

/// Player state as last observed by the poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub connected: bool,
    pub path: String,
    pub playlist_index: i64,
    pub movie_index: i64,
    /// Seconds
    pub position: f64,
    /// Seconds
    pub duration: f64,
    /// Linear, 0.0 to 1.0
    pub volume: f64,
    pub rate: f64,
    pub playing: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            connected: false,
            path: String::new(),
            playlist_index: NO_SELECTION,
            movie_index: NO_SELECTION,
            position: 0.0,
            duration: 0.0,
            volume: 0.0,
            rate: 0.0,
            playing: false,
        }
    }
}

/// What the player sends back for [`STATE_QUERY`]. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateReply {
    path: Option<String>,
    playlist_index: Option<i64>,
    movie_index: Option<i64>,
    position: Option<f64>,
    duration: Option<f64>,
    volume: Option<f64>,
    rate: Option<f64>,
    playing: Option<bool>,
}

impl PlaybackState {
    /// Decode a state-query reply on top of the default state.
    pub fn decode_reply(reply: &str) -> Result<Self, ProtocolError> {
        Self::default().apply_reply(reply)
    }

    /// Decode a state-query reply on top of `self`.
    ///
    /// Keys the player leaves out keep their current value, so a selection
    /// set locally (see `state-poller`) survives players that do not
    /// report indices. The result is always marked connected.
    pub fn apply_reply(&self, reply: &str) -> Result<Self, ProtocolError> {
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ProtocolError::EmptyReply);
        }

        let fields: StateReply = serde_json::from_str(reply)?;
        let previous = self.clone();

        Ok(Self {
            connected: true,
            path: fields.path.unwrap_or(previous.path),
            playlist_index: fields.playlist_index.unwrap_or(previous.playlist_index),
            movie_index: fields.movie_index.unwrap_or(previous.movie_index),
            position: fields.position.unwrap_or(previous.position),
            duration: fields.duration.unwrap_or(previous.duration),
            volume: fields.volume.unwrap_or(previous.volume).clamp(0.0, 1.0),
            rate: fields.rate.unwrap_or(previous.rate),
            playing: fields.playing.unwrap_or(previous.playing),
        })
    }

    /// Drop to the disconnected shape: transient playback fields are cleared,
    /// the selection, volume and rate survive.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.path.clear();
        self.position = 0.0;
        self.duration = 0.0;
        self.playing = false;
    }

    pub fn disconnected(&self) -> Self {
        let mut state = self.clone();
        state.mark_disconnected();
        state
    }

    pub fn has_selection(&self) -> bool {
        self.playlist_index != NO_SELECTION && self.movie_index != NO_SELECTION
    }
}
