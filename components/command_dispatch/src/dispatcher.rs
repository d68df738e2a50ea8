use crate::allocator::CommandIdAllocator;
use crate::error::DispatchError;
use device_transport::{Transport, DEFAULT_REPLY_DEADLINE};
use relay_protocol::{Ack, Command, CommandId, CommandRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of both the inbound command queue and the outbound ack queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    /// How long the worker waits for the player to answer each command
    pub reply_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reply_deadline: DEFAULT_REPLY_DEADLINE,
        }
    }
}

/// Submission side of the dispatcher. Cheap to clone; the worker keeps
/// running until every clone is dropped and the queue is drained.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::Sender<Command>,
    ids: Arc<CommandIdAllocator>,
    admission: Arc<Mutex<()>>,
}

/// Everything [`Dispatcher::spawn`] sets up
pub struct SpawnedDispatcher {
    pub dispatcher: Dispatcher,
    /// Outbound queue, one ack per admitted command in dispatch order
    pub acks: mpsc::Receiver<Ack>,
    pub worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the worker task that owns the player side of the queue
    pub fn spawn<T>(transport: T, config: DispatcherConfig) -> SpawnedDispatcher
    where
        T: Transport + 'static,
    {
        let capacity = config.queue_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (ack_tx, ack_rx) = mpsc::channel(capacity);

        let worker = tokio::spawn(run_worker(
            transport,
            command_rx,
            ack_tx,
            config.reply_deadline,
        ));

        SpawnedDispatcher {
            dispatcher: Self {
                commands: command_tx,
                ids: Arc::new(CommandIdAllocator::new()),
                admission: Arc::new(Mutex::new(())),
            },
            acks: ack_rx,
            worker,
        }
    }

    /// Assign the next id to `request` and queue it.
    ///
    /// Id assignment and queueing happen under one lock, so the player sees
    /// commands in id order no matter how many callers race here. Waits while
    /// the queue is full.
    pub async fn admit(&self, request: CommandRequest) -> Result<CommandId, DispatchError> {
        let request = request.validate()?;

        let _admission = self.admission.lock().await;
        let slot = self
            .commands
            .reserve()
            .await
            .map_err(|_| DispatchError::WorkerGone)?;

        let command = request.into_command(self.ids.next_id());
        let id = command.id();
        debug!("Admitted command {}: {}", id, command);
        slot.send(command);

        Ok(id)
    }

    /// Queue a command that already carries its id. Waits while the queue is
    /// full.
    pub async fn submit(&self, command: Command) -> Result<(), DispatchError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DispatchError::WorkerGone)
    }
}

async fn run_worker<T: Transport>(
    transport: T,
    mut commands: mpsc::Receiver<Command>,
    acks: mpsc::Sender<Ack>,
    reply_deadline: Duration,
) {
    info!("Command dispatcher started");
    let mut publishing = true;

    while let Some(command) = commands.recv().await {
        debug!("Dispatching command {}: {}", command.id(), command);

        let ack = transport.send(&command, reply_deadline).await;
        if !ack.success {
            warn!(
                "Command {} ({}) could not be delivered to the player",
                ack.command.id(),
                ack.command.name()
            );
        }

        if publishing && acks.send(ack).await.is_err() {
            warn!("Ack queue closed, further acknowledgements are discarded");
            publishing = false;
        }
    }

    info!("Command dispatcher stopped");
}
