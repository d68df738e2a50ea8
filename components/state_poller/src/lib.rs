//! Periodic playback-state collection.
//!
//! The poller asks the player for its state on a fixed interval. A failed or
//! unreadable answer is taken as "player disconnected" rather than an error.

use device_transport::{Transport, DEFAULT_REPLY_DEADLINE};
use parking_lot::RwLock;
use relay_protocol::{Command, PlaybackState, ProtocolError, STATE_QUERY};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum PollError {
    #[error("state query could not be delivered")]
    NotDelivered,

    #[error(transparent)]
    Reply(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub query_deadline: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            query_deadline: DEFAULT_REPLY_DEADLINE,
        }
    }
}

/// Handle to the running poll loop and the state it owns
#[derive(Clone)]
pub struct StatePoller {
    state: Arc<RwLock<PlaybackState>>,
    stop: CancellationToken,
}

impl StatePoller {
    /// Start polling. Every observed state, connected or not, is sent to
    /// `updates` in tick order.
    pub fn spawn<T>(
        transport: T,
        config: PollerConfig,
        updates: mpsc::Sender<PlaybackState>,
    ) -> (Self, JoinHandle<()>)
    where
        T: Transport + 'static,
    {
        let poller = Self {
            state: Arc::new(RwLock::new(PlaybackState::default())),
            stop: CancellationToken::new(),
        };

        let task = tokio::spawn(run(
            transport,
            config,
            Arc::clone(&poller.state),
            updates,
            poller.stop.clone(),
        ));

        (poller, task)
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> PlaybackState {
        self.state.read().clone()
    }

    /// Replace the current state, e.g. to record a selection the player
    /// itself does not track. The next poll builds on top of it.
    pub fn set_state(&self, state: PlaybackState) {
        *self.state.write() = state;
    }

    /// Edit the current state in place under the write lock
    pub fn update_state(&self, edit: impl FnOnce(&mut PlaybackState)) {
        edit(&mut self.state.write());
    }

    /// Stop the poll loop. Calling it more than once is harmless.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

async fn run<T: Transport>(
    transport: T,
    config: PollerConfig,
    state: Arc<RwLock<PlaybackState>>,
    updates: mpsc::Sender<PlaybackState>,
    stop: CancellationToken,
) {
    info!("State poller started, interval {:?}", config.interval);

    let query = Command::unadmitted(STATE_QUERY);
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut publishing = true;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let ack = transport.send(&query, config.query_deadline).await;
        let outcome = if ack.success {
            Ok(ack.value)
        } else {
            Err(PollError::NotDelivered)
        };
        let observed = record(&state, outcome);

        if !publishing {
            continue;
        }
        tokio::select! {
            _ = stop.cancelled() => break,
            sent = updates.send(observed) => {
                if sent.is_err() {
                    debug!("State update receiver closed, polling without publishing");
                    publishing = false;
                }
            }
        }
    }

    info!("State poller stopped");
}

/// Fold one poll outcome into the owned state and return the new snapshot
fn record(state: &RwLock<PlaybackState>, reply: Result<String, PollError>) -> PlaybackState {
    let mut current = state.write();
    let was_connected = current.connected;

    let decoded = reply.and_then(|reply| current.apply_reply(&reply).map_err(PollError::from));
    match decoded {
        Ok(fresh) => {
            *current = fresh;
            if !was_connected {
                info!("Player connected");
            }
        }
        Err(e) => {
            current.mark_disconnected();
            if was_connected {
                warn!("Player connection lost: {}", e);
            } else {
                debug!("Player still unreachable: {}", e);
            }
        }
    }

    current.clone()
}
