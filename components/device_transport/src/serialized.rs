use crate::Transport;
use async_trait::async_trait;
use relay_protocol::{Ack, Command};
use std::time::Duration;
use tokio::sync::Mutex;

/// Lets several callers share one transport while only one exchange with the
/// player is in flight at any time.
///
/// The dispatcher worker and the state poller both hold the same
/// `SerializedTransport`, so a poll waits for the current command's
/// connect/write/read to finish and the other way round. Waiters are served
/// in arrival order.
pub struct SerializedTransport<T> {
    inner: T,
    gate: Mutex<()>,
}

impl<T: Transport> SerializedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for SerializedTransport<T> {
    async fn send(&self, command: &Command, deadline: Duration) -> Ack {
        let _exclusive = self.gate.lock().await;
        self.inner.send(command, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records how many exchanges overlap.
    #[derive(Default)]
    struct OverlapDetector {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for OverlapDetector {
        async fn send(&self, command: &Command, _deadline: Duration) -> Ack {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ack::delivered(command.clone(), String::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exchanges_never_overlap() {
        let transport = Arc::new(SerializedTransport::new(OverlapDetector::default()));

        let senders: Vec<_> = (0..16)
            .map(|_| {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    transport
                        .send(&Command::unadmitted("playstate"), Duration::ZERO)
                        .await
                })
            })
            .collect();

        for sender in senders {
            sender.await.unwrap();
        }

        assert_eq!(transport.inner().sent.load(Ordering::SeqCst), 16);
        assert_eq!(transport.inner().max_in_flight.load(Ordering::SeqCst), 1);
    }
}
