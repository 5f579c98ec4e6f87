use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

pub const DEFAULT_MAX_SEEN_IDS: usize = 1000;

#[derive(Debug, Default)]
struct Seen {
    ids: HashSet<String>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

/// Bounded memory of recently seen event IDs, evicting the oldest first.
#[derive(Debug)]
pub struct Deduplicator {
    seen: Mutex<Seen>,
    capacity: usize,
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        Self { seen: Mutex::new(Seen::default()), capacity: capacity.max(1) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.seen.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` was seen before; otherwise records it.
    pub fn is_duplicate(&self, id: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.ids.contains(id) {
            return true;
        }

        seen.ids.insert(id.to_string());
        seen.order.push_back(id.to_string());

        if seen.order.len() > self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.ids.remove(&oldest);
            }
        }

        false
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEEN_IDS)
    }
}
