//! Tracing setup: formatted output plus capture of warnings and errors into
//! an [`ErrorStore`].

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::SystemTime;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::models::{ErrorEntry, ErrorLevel, ErrorStore};

const CAPTURE_CAPACITY: usize = 1000;

/// Captured level for a tracing level; `None` below WARN
fn captured_level(level: &Level) -> Option<ErrorLevel> {
    match *level {
        Level::ERROR => Some(ErrorLevel::Error),
        Level::WARN => Some(ErrorLevel::Warning),
        _ => None,
    }
}

/// Message text and the remaining structured fields of one event
#[derive(Default)]
struct RecordedFields {
    message: String,
    fields: HashMap<String, String>,
}

impl RecordedFields {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for RecordedFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

/// Layer turning WARN and ERROR events into [`ErrorEntry`] values on a
/// bounded channel. Entries are dropped while the channel is full.
pub struct ErrorCollectorLayer {
    sender: SyncSender<ErrorEntry>,
}

impl ErrorCollectorLayer {
    pub fn new() -> (Self, Receiver<ErrorEntry>) {
        Self::with_capacity(CAPTURE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Receiver<ErrorEntry>) {
        let (sender, receiver) = sync_channel(capacity);
        (Self { sender }, receiver)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCollectorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let Some(level) = captured_level(metadata.level()) else {
            return;
        };

        let mut recorded = RecordedFields::default();
        event.record(&mut recorded);

        let entry = ErrorEntry {
            timestamp: SystemTime::now(),
            level,
            message: recorded.message,
            target: metadata.target().to_string(),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            fields: recorded.fields,
        };

        self.sender.try_send(entry).ok();
    }
}

/// Move captured entries into `store` from a dedicated thread
fn forward_captured(receiver: Receiver<ErrorEntry>, store: ErrorStore) {
    std::thread::spawn(move || {
        for entry in receiver {
            store.add_entry(entry);
        }
    });
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns `None` when a
/// global subscriber is already installed (tests, embedding applications).
pub fn init_logging(default_filter: &str) -> Option<ErrorStore> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (collector, receiver) = ErrorCollectorLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(collector)
        .try_init()
        .ok()?;

    let store = ErrorStore::default();
    forward_captured(receiver, store.clone());
    Some(store)
}
