//! The relay's long-running services and how they are wired together.
//!
//! ```text
//!  HTTP ──admit──▶ Dispatcher ──┐                     ┌──▶ SSE client
//!                               ├─▶ SerializedTransport ─▶ player
//!  StatePoller ──query──────────┘                     │
//!      │ states                 acks │                ├──▶ SSE client
//!      └──────────────▶ Hub ◀────────┘ ───────────────┘
//! ```

use crate::config::Config;
use async_trait::async_trait;
use broadcast_hub::{Hub, HubConfig};
use command_dispatch::{Dispatcher, DispatcherConfig, SpawnedDispatcher};
use device_transport::{SerializedTransport, Transport, DEFAULT_REPLY_DEADLINE};
use playlist_store::PlaylistStore;
use relay_protocol::CommandRequest;
use save_trigger::{Persist, PersistError, SaveTrigger};
use state_poller::{PollerConfig, StatePoller};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Player command that makes the player persist its own settings
pub const SAVE_SETTINGS: &str = "save_settings";

/// How long shutdown waits for queued commands to reach the player
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub dispatcher: DispatcherConfig,
    pub poller: PollerConfig,
    pub hub: HubConfig,
    pub save_cooldown: Duration,
}

impl From<&Config> for RelaySettings {
    fn from(config: &Config) -> Self {
        Self {
            dispatcher: DispatcherConfig {
                queue_capacity: config.queue_capacity,
                reply_deadline: config.reply_deadline,
            },
            poller: PollerConfig {
                interval: config.poll_interval,
                query_deadline: DEFAULT_REPLY_DEADLINE,
            },
            hub: HubConfig::default(),
            save_cooldown: config.save_cooldown,
        }
    }
}

/// Handles to every service. Cheap to clone.
#[derive(Clone)]
pub struct Relay {
    pub dispatcher: Dispatcher,
    pub poller: StatePoller,
    pub hub: Hub,
    pub saves: SaveTrigger,
    pub playlists: Arc<PlaylistStore>,
}

/// Background tasks behind a [`Relay`]
pub struct RelayTasks {
    dispatcher: JoinHandle<()>,
    poller: JoinHandle<()>,
    hub: JoinHandle<()>,
    saver: JoinHandle<()>,
}

impl Relay {
    /// Spawn every service. The dispatcher and the poller share one
    /// serialized connection to the player.
    pub fn start<T>(
        transport: T,
        playlists: Arc<PlaylistStore>,
        settings: RelaySettings,
    ) -> (Self, RelayTasks)
    where
        T: Transport + 'static,
    {
        let transport = Arc::new(SerializedTransport::new(transport));

        let SpawnedDispatcher {
            dispatcher,
            acks,
            worker,
        } = Dispatcher::spawn(Arc::clone(&transport), settings.dispatcher.clone());

        let (state_tx, state_rx) = mpsc::channel(settings.dispatcher.queue_capacity.max(1));
        let (poller, poller_task) = StatePoller::spawn(transport, settings.poller, state_tx);

        let (hub, hub_task) = Hub::spawn(acks, state_rx, settings.hub);

        let persistence = RelayPersistence {
            playlists: Arc::clone(&playlists),
            dispatcher: dispatcher.clone(),
        };
        let (saves, saver) = SaveTrigger::spawn(persistence, settings.save_cooldown);

        let relay = Self {
            dispatcher,
            poller,
            hub,
            saves,
            playlists,
        };
        let tasks = RelayTasks {
            dispatcher: worker,
            poller: poller_task,
            hub: hub_task,
            saver,
        };
        (relay, tasks)
    }

    /// Stop polling, run a save that is still waiting for its cool-down,
    /// give queued commands [`DRAIN_GRACE`] to reach the player, then wait
    /// for the hub to wind down.
    ///
    /// Every other clone of this `Relay` must already be dropped, otherwise
    /// the dispatcher keeps waiting for more commands until the grace ends.
    pub async fn shutdown(self, tasks: RelayTasks) {
        self.poller.stop();

        // The save worker holds a dispatcher handle of its own.
        self.saves.shutdown();
        let mut saver = tasks.saver;
        if timeout(DRAIN_GRACE, &mut saver).await.is_err() {
            warn!("Pending save not finished within {:?}, abandoning it", DRAIN_GRACE);
            saver.abort();
        }
        drop(self);

        match timeout(DRAIN_GRACE, tasks.dispatcher).await {
            Ok(_) => info!("Command queue drained"),
            Err(_) => warn!(
                "Command queue not drained within {:?}, dropping the rest",
                DRAIN_GRACE
            ),
        }
        let _ = tasks.poller.await;

        if timeout(DRAIN_GRACE, tasks.hub).await.is_err() {
            warn!("Broadcast hub still running after shutdown");
        }
    }
}

/// Saves the playlists and asks the player to save its own settings
struct RelayPersistence {
    playlists: Arc<PlaylistStore>,
    dispatcher: Dispatcher,
}

#[async_trait]
impl Persist for RelayPersistence {
    async fn save(&self) -> Result<(), PersistError> {
        self.playlists
            .save()
            .await
            .map_err(|e| PersistError::new("playlists", e))?;

        self.dispatcher
            .admit(CommandRequest::new(SAVE_SETTINGS, vec![]))
            .await
            .map_err(|e| PersistError::new("player settings", e))?;

        Ok(())
    }
}
