use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of an admitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Id carried by commands that never go through admission (state queries)
    pub const UNADMITTED: Self = Self(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command body as posted by an HTTP client, before it has an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(default)]
    pub arg: Vec<Value>,
}

impl CommandRequest {
    pub fn new(cmd: impl Into<String>, arg: Vec<Value>) -> Self {
        Self {
            cmd: cmd.into(),
            arg,
        }
    }

    /// Rejects requests that can never form a player command line
    pub fn validate(self) -> Result<Self, ProtocolError> {
        if self.cmd.trim().is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        Ok(self)
    }

    pub fn into_command(self, id: CommandId) -> Command {
        Command::new(id, self.cmd, self.arg)
    }
}

/// An identified instruction for the player.
///
/// Fields are private so the id cannot change after admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    id: CommandId,
    #[serde(rename = "cmd")]
    name: String,
    #[serde(rename = "arg", default)]
    arguments: Vec<Value>,
}

impl Command {
    pub fn new(id: CommandId, name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
        }
    }

    /// A command that bypasses admission, such as the poller's state query
    pub fn unadmitted(name: impl Into<String>) -> Self {
        Self::new(CommandId::UNADMITTED, name, Vec::new())
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// The text line sent to the player, without the trailing newline
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for argument in &self.arguments {
            match argument {
                Value::String(text) => write!(f, " {}", text)?,
                other => write!(f, " {}", other)?,
            }
        }
        Ok(())
    }
}

/// Outcome of handing a command to the player.
///
/// `success` only says the bytes went out; `value` holds whatever the player
/// answered before the reply deadline, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub command: Command,
    pub success: bool,
    pub value: String,
}

impl Ack {
    pub fn not_delivered(command: Command) -> Self {
        Self {
            command,
            success: false,
            value: String::new(),
        }
    }

    pub fn delivered(command: Command, value: impl Into<String>) -> Self {
        Self {
            command,
            success: true,
            value: value.into(),
        }
    }

    pub fn has_reply(&self) -> bool {
        !self.value.is_empty()
    }
}
