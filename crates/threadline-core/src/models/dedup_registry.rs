use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::event::{AgentEvent, EventPayload};
use crate::settings::DedupSettings;

/// Registry of canonical event keys the engine has already applied.
///
/// Bounded by age and count: every `prune_every` insertions, entries older
/// than `ttl` are dropped and, if the table is still above `max_entries`, only
/// the most recently inserted entries are kept. Keys still within the TTL and
/// the cap are never evicted.
pub struct DedupRegistry {
    entries: HashMap<String, DedupEntry>,
    ttl: Duration,
    max_entries: usize,
    prune_every: u64,
    insertions: u64,
}

struct DedupEntry {
    seen_at: Instant,
    order: u64,
}

impl DedupRegistry {
    pub fn new(settings: &DedupSettings) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries: settings.max_entries.max(1),
            prune_every: settings.prune_every.max(1),
            insertions: 0,
        }
    }

    /// Deterministic identity of an event.
    ///
    /// Backend event ids win. Streaming chunks fall back to
    /// session + message + sequence. Everything else gets a fresh key, so
    /// un-keyed control events are never mistaken for duplicates.
    pub fn canonical_key(event: &AgentEvent) -> String {
        if let Some(event_id) = &event.event_id {
            return format!("event:{}", event_id);
        }

        if let (EventPayload::Chunk { .. }, Some(seq)) = (&event.payload, event.seq) {
            return format!(
                "{}:chunk:{}:{}",
                event.session_id,
                event.message_id.as_deref().unwrap_or("-"),
                seq
            );
        }

        format!(
            "{}:{}:gen:{}",
            event.session_id,
            event.payload.kind(),
            uuid::Uuid::new_v4()
        )
    }

    /// Record the event and report whether it should be applied
    pub fn should_apply(&mut self, event: &AgentEvent) -> bool {
        self.should_apply_at(event, Instant::now())
    }

    pub fn should_apply_at(&mut self, event: &AgentEvent, now: Instant) -> bool {
        let key = Self::canonical_key(event);
        if self.entries.contains_key(&key) {
            debug!(key = %key, "Skipping already applied event");
            return false;
        }

        self.insertions += 1;
        self.entries.insert(
            key,
            DedupEntry {
                seen_at: now,
                order: self.insertions,
            },
        );

        if self.insertions % self.prune_every == 0 {
            self.prune(now);
        }

        true
    }

    /// Drop expired entries, then cap the table at `max_entries`
    pub fn prune(&mut self, now: Instant) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.seen_at) <= ttl);

        if self.entries.len() > self.max_entries {
            let mut orders: Vec<u64> = self.entries.values().map(|e| e.order).collect();
            orders.sort_unstable_by(|a, b| b.cmp(a));
            let cutoff = orders[self.max_entries - 1];
            self.entries.retain(|_, entry| entry.order >= cutoff);
        }

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Pruned dedup registry");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ttl_secs: u64, max_entries: usize, prune_every: u64) -> DedupSettings {
        DedupSettings {
            ttl_secs,
            max_entries,
            prune_every,
        }
    }

    fn chunk(message_id: &str, seq: u64) -> AgentEvent {
        AgentEvent::new(
            "s1",
            EventPayload::Chunk {
                content: "x".to_string(),
                model: None,
            },
        )
        .with_message_id(message_id)
        .with_seq(seq)
    }

    #[test]
    fn test_rejects_second_sighting() {
        let mut registry = DedupRegistry::new(&DedupSettings::default());
        let event = chunk("m1", 1);

        assert!(registry.should_apply(&event));
        assert!(!registry.should_apply(&event));
        assert!(registry.should_apply(&chunk("m1", 2)));
    }

    #[test]
    fn test_event_id_takes_precedence() {
        let a = chunk("m1", 1).with_event_id("e1");
        let b = chunk("m2", 9).with_event_id("e1");
        assert_eq!(
            DedupRegistry::canonical_key(&a),
            DedupRegistry::canonical_key(&b)
        );
    }

    #[test]
    fn test_unkeyed_control_events_are_distinct() {
        let done = AgentEvent::new("s1", EventPayload::Done { stop_reason: None });
        let mut registry = DedupRegistry::new(&DedupSettings::default());

        assert!(registry.should_apply(&done));
        assert!(registry.should_apply(&done));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_prune_drops_expired_entries() {
        let mut registry = DedupRegistry::new(&settings(60, 200, 1000));
        let start = Instant::now();

        registry.should_apply_at(&chunk("m1", 1), start);
        registry.should_apply_at(&chunk("m1", 2), start + Duration::from_secs(90));

        registry.prune(start + Duration::from_secs(100));
        assert_eq!(registry.len(), 1);
        // The expired key can be applied again
        assert!(registry.should_apply_at(&chunk("m1", 1), start + Duration::from_secs(100)));
    }

    #[test]
    fn test_prune_caps_to_most_recent() {
        let mut registry = DedupRegistry::new(&settings(300, 3, 5));
        let now = Instant::now();

        for seq in 0..5 {
            registry.should_apply_at(&chunk("m1", seq), now);
        }

        // Fifth insertion triggered a prune down to the three newest keys
        assert_eq!(registry.len(), 3);
        assert!(registry.should_apply_at(&chunk("m1", 0), now));
        assert!(!registry.should_apply_at(&chunk("m1", 4), now));
    }
}
