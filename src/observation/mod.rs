mod event;

pub(crate) use event::Event;

use std::collections::HashMap;
use std::sync::Mutex;

/// Collects acquire/release [`Event`]s so a lock-timeout postmortem can
/// reconstruct who was holding what, without pulling in a tracing stack.
///
/// One instance lives inside [`crate::dispatcher::TransactionDispatcher`],
/// guarded by its own mutex so recording an event never contends with the
/// dispatcher's state lock.
pub(crate) struct Observatory {
    events: Mutex<Vec<Event>>,
}

impl Observatory {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn record(&self, span_tags: HashMap<String, String>, action: &'static str) {
        let mut local_tags = HashMap::new();
        local_tags.insert("action".to_string(), action.to_string());
        self.events
            .lock()
            .unwrap()
            .push(Event::new(span_tags, local_tags));
    }

    /// Logs a summary of recorded events: how many acquire/release pairs
    /// exist per waiter, and the longest-held permits.
    pub(crate) fn analyze(&self) {
        let events = self.events.lock().unwrap();
        log::info!("=== dispatcher observatory: {} events ===", events.len());

        let mut by_span: HashMap<String, Vec<Event>> = HashMap::new();
        for event in events.iter() {
            by_span
                .entry(event.serialize_span_tags())
                .or_insert_with(Vec::new)
                .push(event.clone());
        }

        let mut held: Vec<(String, std::time::Duration)> = Vec::new();
        for (span, occurrences) in &by_span {
            if occurrences.len() == 2 {
                let (a, b) = (&occurrences[0], &occurrences[1]);
                if a.local_tags.get("action").map(String::as_str) == Some("acquired")
                    && b.local_tags.get("action").map(String::as_str) == Some("released")
                {
                    held.push((span.clone(), b.timestamp.duration_since(a.timestamp)));
                }
            }
        }

        use itertools::Itertools;
        for (span, duration) in held.into_iter().sorted_by(|a, b| b.1.cmp(&a.1)).take(10) {
            log::info!("held for {:?}: {}", duration, span);
        }
    }
}
