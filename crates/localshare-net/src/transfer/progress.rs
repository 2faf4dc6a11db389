//! Live byte counters for running transfers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use localshare_shared::Hub;

use crate::notifications::TransferEvent;

struct Entry {
    handled: u64,
    total: u64,
    last_emit: Instant,
}

/// Message id -> bytes handled, with throttled `Progress` events.
pub struct ProgressTracker {
    entries: Mutex<HashMap<i64, Entry>>,
    hub: Hub<TransferEvent>,
    interval: Duration,
}

impl ProgressTracker {
    pub fn new(hub: Hub<TransferEvent>, interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hub,
            interval,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Begin tracking `message_id` at `handled` of `total` bytes. Always emits.
    pub fn start(&self, message_id: i64, handled: u64, total: u64) {
        self.lock().insert(
            message_id,
            Entry {
                handled,
                total,
                last_emit: Instant::now(),
            },
        );
        self.hub.publish(&TransferEvent::Progress {
            message_id,
            handled,
            total,
        });
    }

    /// Add `bytes` and return the new count. Emits only if the last event
    /// for this message is at least one interval old.
    pub fn advance(&self, message_id: i64, bytes: u64) -> u64 {
        let (handled, event) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(&message_id) else {
                return 0;
            };
            entry.handled += bytes;
            let now = Instant::now();
            let due = now.duration_since(entry.last_emit) >= self.interval;
            if due {
                entry.last_emit = now;
            }
            let event = due.then(|| TransferEvent::Progress {
                message_id,
                handled: entry.handled,
                total: entry.total,
            });
            (entry.handled, event)
        };

        // Handlers run outside the lock.
        if let Some(event) = event {
            self.hub.publish(&event);
        }
        handled
    }

    pub fn handled(&self, message_id: i64) -> Option<u64> {
        self.lock().get(&message_id).map(|e| e.handled)
    }

    /// Stop tracking; returns the final count.
    pub fn finish(&self, message_id: i64) -> Option<u64> {
        self.lock().remove(&message_id).map(|e| e.handled)
    }

    pub fn snapshot(&self) -> HashMap<i64, u64> {
        self.lock()
            .iter()
            .map(|(id, e)| (*id, e.handled))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_hub() -> (Hub<TransferEvent>, Arc<Mutex<Vec<TransferEvent>>>) {
        let hub = Hub::new("progress");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        hub.subscribe(move |e: &TransferEvent| sink.lock().unwrap().push(e.clone()));
        (hub, events)
    }

    #[test]
    fn bursts_are_throttled() {
        let (hub, events) = recording_hub();
        let tracker = ProgressTracker::new(hub, Duration::from_secs(3600));

        tracker.start(1, 0, 100);
        for _ in 0..10 {
            tracker.advance(1, 10);
        }

        assert_eq!(tracker.handled(1), Some(100));
        // Only the start event got through.
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_interval_emits_every_step() {
        let (hub, events) = recording_hub();
        let tracker = ProgressTracker::new(hub, Duration::ZERO);

        tracker.start(5, 40, 100);
        assert_eq!(tracker.advance(5, 30), 70);
        assert_eq!(tracker.advance(5, 30), 100);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            TransferEvent::Progress {
                message_id: 5,
                handled: 100,
                total: 100
            }
        );
    }

    #[test]
    fn finish_removes_entry() {
        let (hub, _) = recording_hub();
        let tracker = ProgressTracker::new(hub, Duration::ZERO);
        tracker.start(2, 0, 10);
        tracker.start(3, 0, 10);

        assert_eq!(tracker.snapshot().len(), 2);
        assert_eq!(tracker.finish(2), Some(0));
        assert_eq!(tracker.finish(2), None);
        assert_eq!(tracker.advance(2, 5), 0);
        assert_eq!(tracker.snapshot().keys().copied().collect::<Vec<_>>(), vec![3]);
    }
}
