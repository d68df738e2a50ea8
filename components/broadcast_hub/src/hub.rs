use crate::message::HubMessage;
use relay_protocol::{Ack, PlaybackState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Messages a subscriber may fall behind by before it starts losing them
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

pub type SubscriberId = u64;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("broadcast hub is no longer running")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub mailbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

type Mailbox = mpsc::Sender<Arc<HubMessage>>;

enum Control {
    Join {
        reply: oneshot::Sender<(SubscriberId, mpsc::Receiver<Arc<HubMessage>>)>,
    },
    Leave(SubscriberId),
}

/// Control handle for the hub loop. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    control: mpsc::UnboundedSender<Control>,
    subscribers: Arc<AtomicUsize>,
}

/// The reading end of one subscriber's mailbox.
///
/// Dropping it deregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    messages: mpsc::Receiver<Arc<HubMessage>>,
    control: mpsc::UnboundedSender<Control>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message, or `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.messages.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.messages.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The hub may already be gone; nothing left to deregister from then.
        let _ = self.control.send(Control::Leave(self.id));
    }
}

impl Hub {
    /// Start the hub loop reading from the dispatcher's ack queue and the
    /// poller's state queue.
    ///
    /// The loop ends once both inputs are closed and every `Hub` and
    /// `Subscription` is dropped.
    pub fn spawn(
        acks: mpsc::Receiver<Ack>,
        states: mpsc::Receiver<PlaybackState>,
        config: HubConfig,
    ) -> (Self, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let subscribers = Arc::new(AtomicUsize::new(0));

        let registry = Registry {
            mailboxes: HashMap::new(),
            next_id: 1,
            mailbox_capacity: config.mailbox_capacity.max(1),
            count: Arc::clone(&subscribers),
        };
        let task = tokio::spawn(run(registry, control_rx, acks, states));

        (
            Self {
                control: control_tx,
                subscribers,
            },
            task,
        )
    }

    /// Register a new subscriber and hand back its mailbox
    pub async fn join(&self) -> Result<Subscription, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Control::Join { reply: reply_tx })
            .map_err(|_| HubError::Closed)?;

        let (id, messages) = reply_rx.await.map_err(|_| HubError::Closed)?;
        Ok(Subscription {
            id,
            messages,
            control: self.control.clone(),
        })
    }

    /// Deregister a subscriber. Unknown ids are ignored.
    pub fn leave(&self, id: SubscriberId) {
        let _ = self.control.send(Control::Leave(id));
    }

    /// Registered subscribers as of the hub loop's last registry change
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

struct Registry {
    mailboxes: HashMap<SubscriberId, Mailbox>,
    next_id: SubscriberId,
    mailbox_capacity: usize,
    count: Arc<AtomicUsize>,
}

impl Registry {
    fn join(&mut self, reply: oneshot::Sender<(SubscriberId, mpsc::Receiver<Arc<HubMessage>>)>) {
        let id = self.next_id;
        self.next_id += 1;

        let (mailbox, messages) = mpsc::channel(self.mailbox_capacity);
        self.mailboxes.insert(id, mailbox);
        self.update_count();

        // A caller that gave up waiting is taken straight back out.
        if reply.send((id, messages)).is_err() {
            self.mailboxes.remove(&id);
            self.update_count();
            return;
        }
        info!("Subscriber {} joined, {} registered", id, self.mailboxes.len());
    }

    fn leave(&mut self, id: SubscriberId) {
        if self.mailboxes.remove(&id).is_some() {
            self.update_count();
            info!("Subscriber {} left, {} registered", id, self.mailboxes.len());
        }
    }

    fn broadcast(&mut self, message: HubMessage) {
        let message = Arc::new(message);
        let before = self.mailboxes.len();

        self.mailboxes
            .retain(|id, mailbox| match mailbox.try_send(Arc::clone(&message)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Subscriber {} is behind, dropping {} event", id, message.event());
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {} went away", id);
                    false
                }
            });

        if self.mailboxes.len() != before {
            self.update_count();
        }
    }

    fn update_count(&self) {
        self.count.store(self.mailboxes.len(), Ordering::Relaxed);
    }
}

async fn run(
    mut registry: Registry,
    mut control: mpsc::UnboundedReceiver<Control>,
    mut acks: mpsc::Receiver<Ack>,
    mut states: mpsc::Receiver<PlaybackState>,
) {
    info!("Broadcast hub started");
    let (mut control_open, mut acks_open, mut states_open) = (true, true, true);

    loop {
        tokio::select! {
            biased;

            request = control.recv(), if control_open => match request {
                Some(Control::Join { reply }) => registry.join(reply),
                Some(Control::Leave(id)) => registry.leave(id),
                None => control_open = false,
            },
            ack = acks.recv(), if acks_open => match ack {
                Some(ack) => match HubMessage::from_ack(&ack) {
                    Ok(message) => registry.broadcast(message),
                    Err(e) => warn!(
                        "Failed to serialize ack for command {}: {}",
                        ack.command.id(),
                        e
                    ),
                },
                None => acks_open = false,
            },
            state = states.recv(), if states_open => match state {
                Some(state) => match HubMessage::from_state(&state) {
                    Ok(message) => registry.broadcast(message),
                    Err(e) => warn!("Failed to serialize playback state: {}", e),
                },
                None => states_open = false,
            },
            else => break,
        }
    }

    info!("Broadcast hub stopped");
}
