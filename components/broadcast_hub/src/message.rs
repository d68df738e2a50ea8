use relay_protocol::{Ack, PlaybackState};
use std::fmt;

/// Event types understood by the web client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommandAck,
    PlaybackState,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CommandAck => "commandACK",
            EventKind::PlaybackState => "playbackState",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A serialized event, ready to be written to any subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubMessage {
    kind: EventKind,
    data: String,
}

impl HubMessage {
    pub fn from_ack(ack: &Ack) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: EventKind::CommandAck,
            data: serde_json::to_string(ack)?,
        })
    }

    pub fn from_state(state: &PlaybackState) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: EventKind::PlaybackState,
            data: serde_json::to_string(state)?,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn event(&self) -> &'static str {
        self.kind.as_str()
    }

    /// JSON payload
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Event-stream framing: `event: <type>\ndata: <json>\n\n`
    pub fn frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.data)
    }
}
