//! VisibilityScheduler (spec.md §4.3): time-driven state transitions for a
//! single queue's MessageStore. Free functions rather than a struct because
//! all the state they operate on already lives in the MessageStore and
//! GroupLockTable owned by the enclosing Queue.

use crate::sqs::group_lock::GroupLockTable;
use crate::sqs::message::MessageState;
use crate::sqs::store::MessageStore;

pub struct SweepOutcome {
    /// True if at least one message transitioned Inflight -> Pending, or a
    /// delayed Pending message crossed its `visibleAt`, or a message was
    /// retention-evicted while Inflight — any of these can free group-locked
    /// capacity or make a message newly eligible for delivery, both of which
    /// should wake parked receivers.
    pub newly_eligible: bool,
    /// How many messages were evicted entirely for exceeding their
    /// retention window this sweep.
    pub retention_evicted: usize,
}

/// Promotes Inflight -> Pending for every message whose visibility deadline
/// has elapsed, surfaces every delayed Pending message whose `visibleAt` has
/// elapsed, then evicts every message (Pending or Inflight) whose retention
/// window has elapsed. `receiveCount` is never touched here — only a
/// receive increments it.
pub fn sweep(
    store: &mut MessageStore,
    groups: &mut GroupLockTable,
    now: u64,
    retention_millis: u64,
) -> SweepOutcome {
    let mut newly_eligible = false;

    for id in store.pop_eligible(now) {
        let transitioned = if let Some(message) = store.get_mut(&id) {
            match message.state {
                MessageState::Inflight { .. } => {
                    message.state = MessageState::Pending { visible_at: now };
                    true
                }
                // Already Pending: pop_eligible only surfaces entries whose
                // key (visibleAt here) is <= now, so this is a delayed
                // message crossing into visibility, not a no-op.
                MessageState::Pending { .. } => {
                    newly_eligible = true;
                    false
                }
            }
        } else {
            false
        };

        if transitioned {
            if let Some(message) = store.get(&id) {
                if let Some(ref group) = message.message_group_id {
                    groups.release(group, &id);
                }
            }
            store.resync_visibility(&id);
            newly_eligible = true;
        }
    }

    let mut retention_evicted = 0;
    for id in store.retention_expired(now, retention_millis) {
        if let Some(message) = store.remove(&id) {
            if let Some(ref group) = message.message_group_id {
                groups.release(group, &message.id);
            }
            retention_evicted += 1;
        }
    }

    SweepOutcome {
        newly_eligible,
        retention_evicted,
    }
}

/// Earliest time at which another sweep could produce new work, used by
/// the DelayDispatcher to pace its polling instead of busy-looping.
pub fn next_deadline(store: &mut MessageStore) -> Option<u64> {
    store.next_deadline()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqs::message::Message;
    use std::collections::HashMap;

    fn pending(id: &str, order_index: u64, visible_at: u64, group: Option<&str>) -> Message {
        Message {
            id: id.to_string(),
            body: "b".to_string(),
            attributes: HashMap::new(),
            created_at: 0,
            first_received_at: None,
            receive_count: 0,
            state: MessageState::Pending { visible_at },
            order_index,
            message_group_id: group.map(str::to_string),
            message_deduplication_id: None,
        }
    }

    #[test]
    fn expired_inflight_becomes_pending_and_releases_group() {
        let mut store = MessageStore::new();
        let mut msg = pending("a", 1, 0, Some("g1"));
        msg.state = MessageState::Inflight {
            receipt_handle: "h1".into(),
            visibility_deadline: 100,
        };
        store.insert(msg);

        let mut groups = GroupLockTable::new();
        groups.acquire("g1", "a");

        let outcome = sweep(&mut store, &mut groups, 150, 1_000_000);
        assert!(outcome.newly_eligible);
        assert!(!groups.is_locked("g1"));
        assert!(store.get("a").unwrap().is_pending_and_visible(150));
    }

    #[test]
    fn delayed_message_crossing_visible_at_reports_newly_eligible() {
        let mut store = MessageStore::new();
        store.insert(pending("a", 1, 100, None));
        let mut groups = GroupLockTable::new();

        let outcome = sweep(&mut store, &mut groups, 100, 1_000_000);
        assert!(outcome.newly_eligible);
        assert!(store.get("a").unwrap().is_pending_and_visible(100));
    }

    #[test]
    fn retention_eviction_removes_message_entirely() {
        let mut store = MessageStore::new();
        // visible_at far in the future so pop_eligible doesn't also report
        // this message newly eligible — isolates the retention-only path.
        let mut msg = pending("a", 1, 50_000, None);
        msg.created_at = 0;
        store.insert(msg);
        let mut groups = GroupLockTable::new();

        let outcome = sweep(&mut store, &mut groups, 10_000, 5_000);
        assert!(!outcome.newly_eligible);
        assert!(store.get("a").is_none());
    }
}
