//! DeduplicationIndex (spec.md §4.4): FIFO-only, 5-minute content/explicit
//! dedup cache. The window is a hard constant per spec.md §9 ("do not
//! parameterize differently").

use std::collections::HashMap;

pub const DEDUP_WINDOW_MILLIS: u64 = 5 * 60 * 1000;

#[derive(Clone)]
pub struct DedupEntry {
    pub message_id: String,
    pub md5_of_body: String,
    pub md5_of_message_attributes: Option<String>,
    inserted_at: u64,
}

#[derive(Default)]
pub struct DeduplicationIndex {
    entries: HashMap<String, DedupEntry>,
}

impl DeduplicationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the prior entry if `dedup_id` was inserted within the last
    /// 5 minutes (lazy expiry: an expired entry found here is dropped).
    pub fn lookup(&mut self, dedup_id: &str, now: u64) -> Option<DedupEntry> {
        match self.entries.get(dedup_id) {
            Some(entry) if now.saturating_sub(entry.inserted_at) < DEDUP_WINDOW_MILLIS => {
                Some(entry.clone())
            }
            Some(_) => {
                self.entries.remove(dedup_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(
        &mut self,
        dedup_id: String,
        message_id: String,
        md5_of_body: String,
        md5_of_message_attributes: Option<String>,
        now: u64,
    ) {
        self.entries.insert(
            dedup_id,
            DedupEntry {
                message_id,
                md5_of_body,
                md5_of_message_attributes,
                inserted_at: now,
            },
        );
    }

    /// Periodic cleanup, called from the DelayDispatcher tick so the map
    /// doesn't grow unboundedly on high-traffic FIFO queues between lookups.
    pub fn sweep(&mut self, now: u64) {
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) < DEDUP_WINDOW_MILLIS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_window_returns_entry() {
        let mut index = DeduplicationIndex::new();
        index.insert("d1".into(), "m1".into(), "md5".into(), None, 1_000);
        let hit = index.lookup("d1", 1_000 + DEDUP_WINDOW_MILLIS - 1);
        assert_eq!(hit.unwrap().message_id, "m1");
    }

    #[test]
    fn miss_after_window_and_entry_is_gone() {
        let mut index = DeduplicationIndex::new();
        index.insert("d1".into(), "m1".into(), "md5".into(), None, 1_000);
        assert!(index.lookup("d1", 1_000 + DEDUP_WINDOW_MILLIS).is_none());
        // lazily removed, not just reported expired
        assert!(index.lookup("d1", 1_000 + DEDUP_WINDOW_MILLIS).is_none());
    }

    #[test]
    fn periodic_sweep_drops_expired_entries() {
        let mut index = DeduplicationIndex::new();
        index.insert("d1".into(), "m1".into(), "md5".into(), None, 0);
        index.sweep(DEDUP_WINDOW_MILLIS + 1);
        assert_eq!(index.entries.len(), 0);
    }
}
