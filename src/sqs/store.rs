//! MessageStore (spec.md §4.2): a composite index over a queue's messages.
//!
//! Three views are kept in sync on every mutation, which — because all
//! mutation happens under the owning `Queue`'s single lock (spec.md §5) —
//! is enough to satisfy "the three indices agree on membership at all
//! times":
//!
//! - `messages`: id → Message (primary)
//! - `order`: orderIndex → id, for FIFO-ordered / oldest-first scans
//! - `visibility_heap`: a min-heap keyed by whichever timestamp currently
//!   governs the message (`visibleAt` while Pending, `visibilityDeadline`
//!   while Inflight), used by the VisibilityScheduler to find the next
//!   state transition without scanning every message.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use crate::sqs::message::{Message, MessageState};

fn visibility_key(message: &Message) -> u64 {
    match message.state {
        MessageState::Pending { visible_at } => visible_at,
        MessageState::Inflight {
            visibility_deadline,
            ..
        } => visibility_deadline,
    }
}

#[derive(Default)]
pub struct MessageStore {
    messages: HashMap<String, Message>,
    order: BTreeMap<u64, String>,
    visibility_heap: BinaryHeap<Reverse<(u64, String)>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, message: Message) {
        let key = visibility_key(&message);
        self.order.insert(message.order_index, message.id.clone());
        self.visibility_heap.push(Reverse((key, message.id.clone())));
        self.messages.insert(message.id.clone(), message);
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.get_mut(id)
    }

    /// Call after mutating a message's state/deadline in place, so the
    /// by-visibility heap picks up the new key. The old heap entry is left
    /// in place and filtered out lazily (it no longer matches the
    /// message's current key).
    pub fn resync_visibility(&mut self, id: &str) {
        if let Some(message) = self.messages.get(id) {
            let key = visibility_key(message);
            self.visibility_heap.push(Reverse((key, id.to_string())));
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let message = self.messages.remove(id)?;
        self.order.remove(&message.order_index);
        Some(message)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids in ascending orderIndex (arrival) order.
    pub fn iter_by_order(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    /// Earliest future (or past-due) transition time across all messages,
    /// used to arm the DelayDispatcher's timer. Cleans stale heap entries
    /// as a side effect.
    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(Reverse((key, id))) = self.visibility_heap.peek().cloned() {
            match self.messages.get(&id) {
                Some(message) if visibility_key(message) == key => return Some(key),
                _ => {
                    self.visibility_heap.pop();
                }
            }
        }
        None
    }

    /// Pops every heap entry with key <= now whose message still exists
    /// and still carries that key (i.e. isn't stale), returning their ids.
    /// Does not otherwise mutate the messages — callers decide what a
    /// due transition means for the message's state.
    pub fn pop_eligible(&mut self, now: u64) -> Vec<String> {
        let mut due = Vec::new();
        while let Some(Reverse((key, _))) = self.visibility_heap.peek() {
            if *key > now {
                break;
            }
            let Reverse((key, id)) = self.visibility_heap.pop().unwrap();
            match self.messages.get(&id) {
                Some(message) if visibility_key(message) == key => due.push(id),
                _ => {}
            }
        }
        due
    }

    /// Ids whose retention window has elapsed: `now - createdAt > retention`.
    pub fn retention_expired(&self, now: u64, retention_millis: u64) -> Vec<String> {
        self.messages
            .values()
            .filter(|m| now.saturating_sub(m.created_at) > retention_millis)
            .map(|m| m.id.clone())
            .collect()
    }

    /// (visible, inflight, delayed) counts for ApproximateNumberOfMessages*.
    /// A single O(n) pass rather than maintained counters: the
    /// visible/delayed split is a function of wall-clock time against
    /// `visibleAt`, not a discrete state transition, so there is no event
    /// to hang an O(1) counter update off of.
    pub fn stats(&self, now: u64) -> (usize, usize, usize) {
        let mut visible = 0;
        let mut inflight = 0;
        let mut delayed = 0;
        for message in self.messages.values() {
            match message.state {
                MessageState::Inflight { .. } => inflight += 1,
                MessageState::Pending { visible_at } if visible_at <= now => visible += 1,
                MessageState::Pending { .. } => delayed += 1,
            }
        }
        (visible, inflight, delayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn msg(id: &str, order_index: u64, state: MessageState) -> Message {
        Message {
            id: id.to_string(),
            body: "b".to_string(),
            attributes: StdHashMap::new(),
            created_at: 0,
            first_received_at: None,
            receive_count: 0,
            state,
            order_index,
            message_group_id: None,
            message_deduplication_id: None,
        }
    }

    #[test]
    fn indices_agree_after_insert_and_remove() {
        let mut store = MessageStore::new();
        store.insert(msg("a", 1, MessageState::Pending { visible_at: 0 }));
        store.insert(msg("b", 2, MessageState::Pending { visible_at: 0 }));
        assert_eq!(store.len(), 2);
        assert_eq!(store.iter_by_order().collect::<Vec<_>>(), vec!["a", "b"]);

        store.remove("a");
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter_by_order().collect::<Vec<_>>(), vec!["b"]);
        assert!(store.get("a").is_none());
    }

    #[test]
    fn pop_eligible_ignores_stale_heap_entries() {
        let mut store = MessageStore::new();
        store.insert(msg("a", 1, MessageState::Pending { visible_at: 100 }));

        // Simulate a ChangeVisibility-style update pushing the deadline out.
        if let Some(m) = store.get_mut("a") {
            m.state = MessageState::Pending { visible_at: 500 };
        }
        store.resync_visibility("a");

        // The stale (100) entry must not cause an early, incorrect pop.
        assert!(store.pop_eligible(100).is_empty());
        assert_eq!(store.pop_eligible(500), vec!["a".to_string()]);
    }

    #[test]
    fn next_deadline_reflects_earliest_live_entry() {
        let mut store = MessageStore::new();
        store.insert(msg("a", 1, MessageState::Pending { visible_at: 300 }));
        store.insert(msg("b", 2, MessageState::Pending { visible_at: 100 }));
        assert_eq!(store.next_deadline(), Some(100));
        store.remove("b");
        assert_eq!(store.next_deadline(), Some(300));
    }

    #[test]
    fn retention_expired_flags_old_messages() {
        let mut store = MessageStore::new();
        let mut old = msg("a", 1, MessageState::Pending { visible_at: 0 });
        old.created_at = 0;
        store.insert(old);
        assert_eq!(store.retention_expired(1000, 500), vec!["a".to_string()]);
        assert!(store.retention_expired(400, 500).is_empty());
    }
}
