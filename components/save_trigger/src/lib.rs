//! Debounced persistence.
//!
//! Mutating requests call [`SaveTrigger::try_signal`] as often as they like;
//! the worker runs [`Persist::save`] at most once per cool-down window. A
//! signal that arrives during the cool-down is kept (only one) and handled
//! when the window ends, so the last change is never lost. On
//! [`SaveTrigger::shutdown`] a kept signal is saved right away.

use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
#[error("failed to persist {what}")]
pub struct PersistError {
    what: String,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl PersistError {
    pub fn new(
        what: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            what: what.into(),
            source: source.into(),
        }
    }
}

/// Whatever writes the relay's state somewhere durable. Must be safe to call
/// repeatedly.
#[async_trait]
pub trait Persist: Send + Sync {
    async fn save(&self) -> Result<(), PersistError>;
}

#[derive(Clone)]
pub struct SaveTrigger {
    signals: mpsc::Sender<()>,
    stop: CancellationToken,
}

impl SaveTrigger {
    pub fn spawn<P>(persist: P, cooldown: Duration) -> (Self, JoinHandle<()>)
    where
        P: Persist + 'static,
    {
        let (signals, pending) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let worker = tokio::spawn(run(persist, pending, cooldown, stop.clone()));
        (Self { signals, stop }, worker)
    }

    /// Stop the worker. A pending save runs first without waiting out the
    /// cool-down; await the worker's handle to know it is done.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Ask for a save without waiting. Returns `false` when a save is already
    /// pending, in which case this signal is folded into it.
    pub fn try_signal(&self) -> bool {
        match self.signals.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Save already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Save worker is not running, change will not be persisted");
                false
            }
        }
    }
}

async fn run<P: Persist>(
    persist: P,
    mut pending: mpsc::Receiver<()>,
    cooldown: Duration,
    stop: CancellationToken,
) {
    info!("Save worker started, cool-down {:?}", cooldown);

    loop {
        tokio::select! {
            biased;

            signal = pending.recv() => {
                if signal.is_none() {
                    break;
                }
            }
            _ = stop.cancelled() => break,
        }

        save(&persist).await;

        tokio::select! {
            _ = tokio::time::sleep(cooldown) => {}
            _ = stop.cancelled() => {
                if pending.try_recv().is_ok() {
                    info!("Saving pending change before stopping");
                    save(&persist).await;
                }
                break;
            }
        }
    }

    info!("Save worker stopped");
}

async fn save<P: Persist>(persist: &P) {
    match persist.save().await {
        Ok(()) => info!("State saved"),
        Err(e) => error!("Saving state failed: {:?}", e),
    }
}
