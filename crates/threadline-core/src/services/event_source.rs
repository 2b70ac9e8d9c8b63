use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// Source of raw inbound event payloads
pub trait EventSource: Send + Sync {
    /// A fresh subscription; ends when the source closes
    fn subscribe(&self) -> BoxStream<'static, Value>;
}

/// [`EventSource`] backed by a tokio broadcast channel.
///
/// The transport layer publishes decoded JSON payloads; every subscriber sees
/// every payload published after it subscribed.
#[derive(Clone)]
pub struct BroadcastEventSource {
    sender: broadcast::Sender<Value>,
}

impl BroadcastEventSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a payload, returning how many subscribers received it
    pub fn publish(&self, payload: Value) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }

    pub fn sender(&self) -> broadcast::Sender<Value> {
        self.sender.clone()
    }
}

impl EventSource for BroadcastEventSource {
    fn subscribe(&self) -> BoxStream<'static, Value> {
        let rx = self.sender.subscribe();

        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged, continuing with latest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
