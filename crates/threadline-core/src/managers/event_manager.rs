//! Ingress for push events.
//!
//! Every payload is validated, passed through the dedup registry, merged into
//! the shared store under one short lock, and the resulting effects are
//! written in the background. A failed write is logged and never rolled back
//! into the live view.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::merge::{self, Effect};
use crate::models::{AgentEvent, EventError, SharedConversationsStore, now_millis};
use crate::repositories::ConversationRepository;
use crate::services::EventSource;

/// What happened to one inbound payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Merged; `persisted` messages were queued for writing
    Applied { persisted: usize },
    /// Canonical key already applied
    Duplicate,
    /// Unknown type tag, or a session that is not registered
    Ignored,
    /// Failed validation
    Rejected,
}

struct Subscription {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct EventManager {
    store: SharedConversationsStore,
    repository: Arc<dyn ConversationRepository>,
    /// Tail of the write chain
    pending: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl EventManager {
    pub fn new(
        store: SharedConversationsStore,
        repository: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self {
            store,
            repository,
            pending: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to `source`. Only one subscription runs at a time; a second
    /// call while it is active does nothing and returns false.
    pub fn start(self: &Arc<Self>, source: &dyn EventSource) -> bool {
        let mut subscription = self.subscription.lock();
        if subscription.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("Event subscription already running");
            return false;
        }

        let mut stream = source.subscribe();
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let manager = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = stream.next() => match next {
                        Some(payload) => {
                            manager.ingest_value(payload);
                        }
                        None => {
                            info!("Event source closed");
                            break;
                        }
                    },
                }
            }
        });

        *subscription = Some(Subscription { shutdown, task });
        info!("Event subscription started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Cancel the subscription and wait for pending writes
    pub async fn stop(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(Subscription { shutdown, task }) = subscription {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!(error = ?e, "Event subscription task failed");
            }
            info!("Event subscription stopped");
        }

        self.flush().await;
    }

    /// Validate and apply one raw payload
    pub fn ingest_value(&self, payload: Value) -> IngestOutcome {
        match AgentEvent::from_value(payload) {
            Ok(event) => self.ingest(event),
            Err(EventError::UnknownType(kind)) => {
                debug!(kind = %kind, "Ignoring event of unknown type");
                IngestOutcome::Ignored
            }
            Err(e) => {
                warn!(error = %e, "Dropping invalid event");
                IngestOutcome::Rejected
            }
        }
    }

    /// Apply one validated event
    pub fn ingest(&self, event: AgentEvent) -> IngestOutcome {
        let now = now_millis();

        let effects = {
            let mut store = self.store.lock();
            if !store.has_session(&event.session_id) {
                debug!(session_id = %event.session_id, "Dropping event for session not in registry");
                return IngestOutcome::Ignored;
            }
            if !store.should_apply(&event) {
                return IngestOutcome::Duplicate;
            }
            let Some(chat) = store.chat_mut(&event.session_id) else {
                return IngestOutcome::Ignored;
            };

            let effects = merge::reduce(chat, &event, now);
            store.touch_session(&event.session_id, now);
            effects
        };

        let persisted = effects.iter().map(Effect::len).sum();
        for effect in effects {
            self.persist(effect);
        }

        IngestOutcome::Applied { persisted }
    }

    /// Queue a write behind every earlier one, so the store sees the same
    /// order the merges happened in
    fn persist(&self, effect: Effect) {
        let repository = Arc::clone(&self.repository);
        let mut pending = self.pending.lock();
        let previous = pending.take();

        *pending = Some(tokio::spawn(async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
            {
                warn!(error = ?e, "Earlier persistence task failed");
            }
            let result = match effect {
                Effect::Persist(message) => repository.save_message(message).await,
                Effect::PersistBatch(messages) => repository.save_message_batch(messages).await,
                Effect::Rekey { from, message } => {
                    match repository.delete_message(&message.session_id, &from).await {
                        Ok(()) => repository.save_message(message).await,
                        Err(e) => Err(e),
                    }
                }
            };
            if let Err(e) = result {
                warn!(error = ?e, "Background persistence failed");
            }
        }));
    }

    /// Wait for every queued write, including ones queued while waiting
    pub async fn flush(&self) {
        loop {
            let Some(handle) = self.pending.lock().take() else {
                break;
            };
            if let Err(e) = handle.await {
                warn!(error = ?e, "Persistence task failed");
            }
        }
    }
}
