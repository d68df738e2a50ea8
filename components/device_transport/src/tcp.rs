use crate::error::TransportError;
use crate::Transport;
use async_trait::async_trait;
use relay_protocol::{Ack, Command};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest reply the player can return in one exchange
pub const REPLY_BUFFER_SIZE: usize = 4096;

/// Opens a fresh TCP connection per command.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Connect {
                address: self.address.clone(),
                source,
            }),
            Err(_) => Err(TransportError::ConnectTimeout {
                address: self.address.clone(),
                timeout: self.connect_timeout,
            }),
        }
    }

    /// Connect, write the command line, then wait up to `deadline` for an answer.
    ///
    /// `Ok(None)` means the command went out but nothing came back in time.
    async fn exchange(
        &self,
        command: &Command,
        deadline: Duration,
    ) -> Result<Option<String>, TransportError> {
        let mut stream = self.connect().await?;

        let line = format!("{}\n", command.to_line());
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|source| TransportError::Write {
                address: self.address.clone(),
                source,
            })?;

        let mut buffer = vec![0u8; REPLY_BUFFER_SIZE];
        let reply = match timeout(deadline, stream.read(&mut buffer)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(read)) => Some(String::from_utf8_lossy(&buffer[..read]).into_owned()),
            Ok(Err(e)) => {
                trace!("Reading reply to {} failed: {}", command, e);
                None
            }
            Err(_) => None,
        };

        Ok(reply)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, command: &Command, deadline: Duration) -> Ack {
        match self.exchange(command, deadline).await {
            Ok(Some(reply)) => {
                debug!("{} -> {}", command, reply.trim_end());
                Ack::delivered(command.clone(), reply)
            }
            Ok(None) => {
                debug!("{} (no reply)", command);
                Ack::delivered(command.clone(), String::new())
            }
            Err(e) => {
                debug!("Command {} not delivered: {}", command.id(), e);
                Ack::not_delivered(command.clone())
            }
        }
    }
}
