// src/debounce.rs
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Pending {
    deadline: Instant,
    action: Box<dyn FnOnce()>,
}

/// Per-key one-shot timers polled from the UI loop.
///
/// Scheduling under a key replaces whatever was pending there, so only the
/// latest edit survives a burst. Keys never share a timer.
pub struct Debouncer<K> {
    pending: HashMap<K, Pending>,
}

impl<K: Eq + Hash + Clone> Default for Debouncer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, key: K, delay: Duration, action: impl FnOnce() + 'static) -> bool {
        self.schedule_at(key, Instant::now(), delay, action)
    }

    /// Arms `action` for `now + delay`. Returns true if an earlier action was cancelled.
    pub fn schedule_at(&mut self, key: K, now: Instant, delay: Duration, action: impl FnOnce() + 'static) -> bool {
        self.pending
            .insert(
                key,
                Pending {
                    deadline: now + delay,
                    action: Box::new(action),
                },
            )
            .is_some()
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Earliest deadline still armed; the UI uses it to schedule its next repaint.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Runs every action whose deadline has passed, earliest first.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let mut due: Vec<(K, Instant)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, p)| (k.clone(), p.deadline))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);
        let mut fired = 0;
        for (key, _) in due {
            if let Some(pending) = self.pending.remove(&key) {
                (pending.action)();
                fired += 1;
            }
        }
        fired
    }
}
