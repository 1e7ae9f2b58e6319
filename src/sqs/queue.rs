//! Queue (spec.md §4.1): a single queue's state and operations, serialized
//! behind one lock so two queues can run fully in parallel (spec.md §5).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::digest::{md5_hex, md5_of_attributes, sha256_hex};
use crate::error::SqsError;
use crate::ids::{generate_message_id, generate_receipt_handle};
use crate::sqs::attributes::QueueAttributes;
use crate::sqs::dedup::DeduplicationIndex;
use crate::sqs::group_lock::GroupLockTable;
use crate::sqs::message::{Message, MessageState};
use crate::sqs::scheduler;
use crate::sqs::store::MessageStore;
use crate::sqs::types::MessageAttributeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Standard,
    Fifo,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub md5_of_message_body: String,
    pub md5_of_message_attributes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_message_body: String,
    pub md5_of_message_attributes: Option<String>,
    pub attributes: HashMap<String, MessageAttributeValue>,
    pub receive_count: u32,
    pub sent_timestamp: u64,
    pub first_received_at: u64,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatistics {
    pub approx_visible: usize,
    pub approx_inflight: usize,
    pub approx_delayed: usize,
}

struct QueueInner {
    attributes: QueueAttributes,
    store: MessageStore,
    groups: GroupLockTable,
    dedup: DeduplicationIndex,
    inflight_by_handle: HashMap<String, String>,
    seq: u64,
    last_modified_at: u64,
}

pub struct Queue {
    pub name: String,
    pub created_at: u64,
    clock: Arc<dyn Clock>,
    inner: Mutex<QueueInner>,
    /// Wakes parked long-polling receives on send, visibility/delay expiry,
    /// or queue deletion. Stands in for spec.md §4.7's LongPollWaitRegistry:
    /// because every receive re-attempts under the queue's own lock after
    /// waking, spurious/broadcast wakeups are harmless (spec.md §4.7).
    notify: Notify,
    deleted: std::sync::atomic::AtomicBool,
}

impl Queue {
    pub fn new(name: String, attributes: QueueAttributes, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Queue {
            name,
            created_at: now,
            clock,
            inner: Mutex::new(QueueInner {
                attributes,
                store: MessageStore::new(),
                groups: GroupLockTable::new(),
                dedup: DeduplicationIndex::new(),
                inflight_by_handle: HashMap::new(),
                seq: 0,
                last_modified_at: now,
            }),
            notify: Notify::new(),
            deleted: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> QueueKind {
        if self.inner.lock().attributes.fifo_queue {
            QueueKind::Fifo
        } else {
            QueueKind::Standard
        }
    }

    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Runs the VisibilityScheduler sweep and wakes parked receivers if
    /// anything became newly eligible. Called lazily at the top of every
    /// send/receive, and periodically by the DelayDispatcher.
    pub fn sweep(&self) {
        let now = self.now();
        let mut inner = self.inner.lock();
        let retention = inner.attributes.message_retention_millis;
        let outcome = scheduler::sweep(&mut inner.store, &mut inner.groups, now, retention);
        inner.dedup.sweep(now);
        // Drop stale handle->id mappings for messages that just expired back
        // to Pending or were retention-evicted; the handle is dead either way.
        inner.inflight_by_handle.retain(|_, id| {
            matches!(
                inner.store.get(id).map(|m| &m.state),
                Some(MessageState::Inflight { .. })
            )
        });
        drop(inner);
        if outcome.retention_evicted > 0 {
            tracing::debug!(
                queue = %self.name,
                count = outcome.retention_evicted,
                "messages evicted for exceeding retention"
            );
        }
        if outcome.newly_eligible {
            self.notify.notify_waiters();
        }
    }

    fn validate_send_size(
        body: &str,
        attrs: &HashMap<String, MessageAttributeValue>,
        max_bytes: u32,
    ) -> Result<(), SqsError> {
        let mut size = body.len();
        for (name, value) in attrs {
            size += name.len() + value.data_type.len();
            size += value.string_value.as_ref().map(String::len).unwrap_or(0);
            size += value
                .binary_value
                .as_ref()
                .map(String::len)
                .unwrap_or(0);
        }
        if size > max_bytes as usize {
            return Err(SqsError::MessageTooLong(format!(
                "Message must be shorter than {max_bytes} bytes (body + attributes)"
            )));
        }
        Ok(())
    }

    fn validate_group_id(group_id: &str) -> Result<(), SqsError> {
        let valid = !group_id.is_empty()
            && group_id.len() <= 128
            && group_id.chars().all(|c| (c as u32) >= 0x21 && (c as u32) <= 0x7E);
        if !valid {
            return Err(SqsError::InvalidParameterValue(
                "MessageGroupId must be 1-128 characters matching [A-Za-z0-9!-~]".into(),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_message(
        &self,
        body: String,
        attributes: HashMap<String, MessageAttributeValue>,
        delay_override: Option<u32>,
        group_id: Option<String>,
        dedup_id: Option<String>,
    ) -> Result<SendOutcome, SqsError> {
        self.sweep();
        let now = self.now();
        let mut inner = self.inner.lock();

        Self::validate_send_size(&body, &attributes, inner.attributes.maximum_message_size_bytes)?;

        let is_fifo = inner.attributes.fifo_queue;
        if is_fifo {
            let group_id = group_id
                .clone()
                .ok_or_else(|| SqsError::MissingParameter("MessageGroupId is required for FIFO queues".into()))?;
            Self::validate_group_id(&group_id)?;
            if delay_override.is_some_and(|d| d > 0) {
                return Err(SqsError::InvalidParameterValue(
                    "DelaySeconds is not supported on a per-message basis for FIFO queues".into(),
                ));
            }
        } else if group_id.is_some() || dedup_id.is_some() {
            return Err(SqsError::InvalidParameterValue(
                "MessageGroupId/MessageDeduplicationId only apply to FIFO queues".into(),
            ));
        }

        let md5_of_body = md5_hex(body.as_bytes());
        let md5_of_attrs = md5_of_attributes(&attributes);

        let effective_dedup_id = if is_fifo {
            if let Some(id) = dedup_id {
                Some(id)
            } else if inner.attributes.content_based_deduplication {
                Some(sha256_hex(body.as_bytes()))
            } else {
                return Err(SqsError::InvalidParameterValue(
                    "MessageDeduplicationId is required unless ContentBasedDeduplication is enabled".into(),
                ));
            }
        } else {
            None
        };

        if let Some(ref dedup_id) = effective_dedup_id {
            if let Some(prior) = inner.dedup.lookup(dedup_id, now) {
                return Ok(SendOutcome {
                    message_id: prior.message_id,
                    md5_of_message_body: prior.md5_of_body,
                    md5_of_message_attributes: prior.md5_of_message_attributes,
                });
            }
        }

        inner.seq += 1;
        let order_index = inner.seq;
        let message_id = generate_message_id();
        let delay_millis = delay_override
            .map(|d| d as u64 * 1000)
            .unwrap_or(inner.attributes.delay_millis as u64);
        let visible_at = now + delay_millis;

        let message = Message {
            id: message_id.clone(),
            body,
            attributes,
            created_at: now,
            first_received_at: None,
            receive_count: 0,
            state: MessageState::Pending { visible_at },
            order_index,
            message_group_id: group_id,
            message_deduplication_id: effective_dedup_id.clone(),
        };
        inner.store.insert(message);
        inner.last_modified_at = now;

        if let Some(dedup_id) = effective_dedup_id {
            inner
                .dedup
                .insert(dedup_id, message_id.clone(), md5_of_body.clone(), md5_of_attrs.clone(), now);
        }

        drop(inner);
        if delay_millis == 0 {
            self.notify.notify_waiters();
        }

        Ok(SendOutcome {
            message_id,
            md5_of_message_body: md5_of_body,
            md5_of_message_attributes: md5_of_attrs,
        })
    }

    fn try_receive_locked(
        inner: &mut QueueInner,
        max: usize,
        visibility_override: Option<u32>,
        now: u64,
    ) -> Vec<ReceivedMessage> {
        let is_fifo = inner.attributes.fifo_queue;
        let candidate_ids: Vec<String> = inner.store.iter_by_order().map(str::to_string).collect();

        let mut selected: Vec<String> = Vec::new();
        let mut seen_groups: HashSet<String> = HashSet::new();

        for id in candidate_ids {
            if selected.len() >= max {
                break;
            }
            let Some(message) = inner.store.get(&id) else {
                continue;
            };
            if !message.is_pending_and_visible(now) {
                continue;
            }
            if is_fifo {
                let group = message
                    .message_group_id
                    .clone()
                    .expect("fifo message always carries a group id");
                if inner.groups.is_locked(&group) || seen_groups.contains(&group) {
                    continue;
                }
                seen_groups.insert(group);
            }
            selected.push(id);
        }

        let visibility_millis = visibility_override
            .map(|v| v as u64 * 1000)
            .unwrap_or(inner.attributes.visibility_timeout_millis as u64);

        let mut results = Vec::with_capacity(selected.len());
        for id in selected {
            let receipt_handle = generate_receipt_handle();
            let deadline = now + visibility_millis;

            let message = inner.store.get_mut(&id).expect("selected id must exist");
            message.receive_count += 1;
            if message.first_received_at.is_none() {
                message.first_received_at = Some(now);
            }
            message.state = MessageState::Inflight {
                receipt_handle: receipt_handle.clone(),
                visibility_deadline: deadline,
            };
            let group = message.message_group_id.clone();
            let sent_timestamp = message.created_at;
            let first_received_at = message.first_received_at.unwrap();
            let receive_count = message.receive_count;
            let dedup_id = message.message_deduplication_id.clone();
            let body = message.body.clone();
            let attrs = message.attributes.clone();

            inner.store.resync_visibility(&id);
            inner.inflight_by_handle.insert(receipt_handle.clone(), id.clone());
            if let Some(ref group) = group {
                inner.groups.acquire(group, &id);
            }

            let md5_of_message_body = md5_hex(body.as_bytes());
            let md5_of_message_attributes = md5_of_attributes(&attrs);

            results.push(ReceivedMessage {
                message_id: id,
                receipt_handle,
                body,
                md5_of_message_body,
                md5_of_message_attributes,
                attributes: attrs,
                receive_count,
                sent_timestamp,
                first_received_at,
                message_group_id: group,
                message_deduplication_id: dedup_id,
            });
        }

        results
    }

    /// Receive up to `max` messages, long-polling up to `wait_millis` if
    /// none are immediately available (spec.md §4.1 Receive algorithm).
    pub async fn receive_messages(
        &self,
        max: usize,
        visibility_override: Option<u32>,
        wait_millis: u32,
    ) -> Vec<ReceivedMessage> {
        debug_assert!((1..=10).contains(&max));

        self.sweep();
        {
            let now = self.now();
            let mut inner = self.inner.lock();
            let results = Self::try_receive_locked(&mut inner, max, visibility_override, now);
            if !results.is_empty() || wait_millis == 0 || self.is_deleted() {
                return results;
            }
        }

        let deadline = self.now() + wait_millis as u64;
        loop {
            if self.is_deleted() {
                return Vec::new();
            }
            let now = self.now();
            if now >= deadline {
                return Vec::new();
            }
            let remaining = Duration::from_millis(deadline - now);

            // Wait for a wakeup (send, sweep-driven expiry, or deletion) or
            // the long-poll deadline, whichever comes first. A spurious
            // wakeup just falls through to re-check below, per spec.md §4.7.
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;

            self.sweep();
            let now = self.now();
            let mut inner = self.inner.lock();
            let results = Self::try_receive_locked(&mut inner, max, visibility_override, now);
            drop(inner);
            if !results.is_empty() {
                return results;
            }
            if self.now() >= deadline || self.is_deleted() {
                return Vec::new();
            }
        }
    }

    pub fn delete_message(&self, receipt_handle: &str) -> Result<(), SqsError> {
        let mut inner = self.inner.lock();
        let Some(id) = inner.inflight_by_handle.get(receipt_handle).cloned() else {
            return Err(SqsError::ReceiptHandleIsInvalid(
                "The receipt handle has expired or does not exist".into(),
            ));
        };

        let still_valid = matches!(
            inner.store.get(&id).map(|m| m.receipt_handle()),
            Some(Some(h)) if h == receipt_handle
        );
        if !still_valid {
            inner.inflight_by_handle.remove(receipt_handle);
            return Err(SqsError::ReceiptHandleIsInvalid(
                "The receipt handle has expired or does not exist".into(),
            ));
        }

        if let Some(message) = inner.store.remove(&id) {
            if let Some(ref group) = message.message_group_id {
                inner.groups.release(group, &message.id);
            }
        }
        inner.inflight_by_handle.remove(receipt_handle);
        Ok(())
    }

    pub fn change_message_visibility(
        &self,
        receipt_handle: &str,
        new_timeout_millis: u32,
    ) -> Result<(), SqsError> {
        if new_timeout_millis > 43_200_000 {
            return Err(SqsError::InvalidParameterValue(
                "VisibilityTimeout must be between 0 and 43200 seconds".into(),
            ));
        }

        let now = self.now();
        let mut inner = self.inner.lock();
        let Some(id) = inner.inflight_by_handle.get(receipt_handle).cloned() else {
            return Err(SqsError::ReceiptHandleIsInvalid(
                "The receipt handle has expired or does not exist".into(),
            ));
        };

        let matches_handle = matches!(
            inner.store.get(&id).map(|m| m.receipt_handle()),
            Some(Some(h)) if h == receipt_handle
        );
        if !matches_handle {
            inner.inflight_by_handle.remove(receipt_handle);
            return Err(SqsError::ReceiptHandleIsInvalid(
                "The receipt handle has expired or does not exist".into(),
            ));
        }

        if new_timeout_millis == 0 {
            let group = inner
                .store
                .get(&id)
                .and_then(|m| m.message_group_id.clone());
            if let Some(message) = inner.store.get_mut(&id) {
                message.state = MessageState::Pending { visible_at: now };
            }
            inner.store.resync_visibility(&id);
            inner.inflight_by_handle.remove(receipt_handle);
            if let Some(group) = group {
                inner.groups.release(&group, &id);
            }
            drop(inner);
            self.notify.notify_waiters();
        } else {
            if let Some(message) = inner.store.get_mut(&id) {
                message.state = MessageState::Inflight {
                    receipt_handle: receipt_handle.to_string(),
                    visibility_deadline: now + new_timeout_millis as u64,
                };
            }
            inner.store.resync_visibility(&id);
        }
        Ok(())
    }

    pub fn purge(&self) -> Result<(), SqsError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        inner.store = MessageStore::new();
        inner.groups.clear();
        inner.inflight_by_handle.clear();
        inner.last_modified_at = now;
        drop(inner);
        tracing::info!(queue = %self.name, "queue purged");
        Ok(())
    }

    pub fn statistics(&self) -> QueueStatistics {
        self.sweep();
        let now = self.now();
        let inner = self.inner.lock();
        let (visible, inflight, delayed) = inner.store.stats(now);
        QueueStatistics {
            approx_visible: visible,
            approx_inflight: inflight,
            approx_delayed: delayed,
        }
    }

    pub fn get_attributes(&self) -> QueueAttributes {
        self.inner.lock().attributes.clone()
    }

    pub fn last_modified_at(&self) -> u64 {
        self.inner.lock().last_modified_at
    }

    pub fn update_attributes(&self, updates: &HashMap<String, String>) -> Result<(), SqsError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        inner.attributes.apply(updates)?;
        inner.last_modified_at = now;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }

    /// Snapshot support: every live message, in arrival order, as owned
    /// copies. Inflight-vs-pending distinction is collapsed by the caller.
    pub fn snapshot_messages(&self) -> Vec<Message> {
        let inner = self.inner.lock();
        inner
            .store
            .iter_by_order()
            .filter_map(|id| inner.store.get(id).cloned())
            .collect()
    }

    /// Snapshot support: re-inserts a message produced by `snapshot_messages`
    /// (or reconstructed from a saved snapshot) bypassing send validation,
    /// since it already passed validation the first time it was sent.
    pub fn restore_message(&self, message: Message) {
        let mut inner = self.inner.lock();
        inner.seq = inner.seq.max(message.order_index);
        if let Some(ref group) = message.message_group_id {
            if message.is_inflight() {
                inner.groups.acquire(group, &message.id);
            }
        }
        inner.store.insert(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn queue(clock: &TestClock, fifo: bool, content_based_dedup: bool) -> Queue {
        let mut attrs = QueueAttributes::default();
        attrs.fifo_queue = fifo;
        attrs.content_based_deduplication = content_based_dedup;
        Queue::new(
            if fifo { "q.fifo".into() } else { "q".into() },
            attrs,
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        )
    }

    // Scenario 1 (spec.md §8): send/receive/delete round trip on a standard queue.
    #[tokio::test]
    async fn scenario_send_receive_delete() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);

        let send = q
            .send_message("hi".into(), HashMap::new(), None, None, None)
            .unwrap();
        assert_eq!(send.md5_of_message_body, "49f68a5c8493ec2c0bf489821c21fc3b");

        let received = q.receive_messages(1, None, 0).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "hi");

        q.delete_message(&received[0].receipt_handle).unwrap();
        assert!(q.receive_messages(1, None, 0).await.is_empty());
    }

    // Scenario 2: content-based FIFO dedup collapses two sends into one message.
    #[tokio::test]
    async fn scenario_fifo_content_based_dedup() {
        let clock = TestClock::new(0);
        let q = queue(&clock, true, true);

        let first = q
            .send_message("x".into(), HashMap::new(), None, Some("g".into()), None)
            .unwrap();
        let second = q
            .send_message("x".into(), HashMap::new(), None, Some("g".into()), None)
            .unwrap();

        assert_eq!(first.message_id, second.message_id);
        assert_eq!(q.len(), 1);
    }

    // Scenario 3: FIFO strict per-group ordering with group locking.
    #[tokio::test]
    async fn scenario_fifo_group_ordering() {
        let clock = TestClock::new(0);
        let q = queue(&clock, true, false);

        q.send_message("a".into(), HashMap::new(), None, Some("g1".into()), Some("d1".into()))
            .unwrap();
        q.send_message("b".into(), HashMap::new(), None, Some("g1".into()), Some("d2".into()))
            .unwrap();
        q.send_message("c".into(), HashMap::new(), None, Some("g2".into()), Some("d3".into()))
            .unwrap();

        let received = q.receive_messages(10, None, 0).await;
        let bodies: Vec<&str> = received.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "c"]);

        let a_handle = received
            .iter()
            .find(|m| m.body == "a")
            .unwrap()
            .receipt_handle
            .clone();
        q.delete_message(&a_handle).unwrap();

        let received = q.receive_messages(10, None, 0).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "b");
    }

    // Scenario 4: delayed delivery.
    #[tokio::test]
    async fn scenario_delayed_delivery() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);

        q.send_message("m".into(), HashMap::new(), Some(1), None, None)
            .unwrap();
        assert!(q.receive_messages(1, None, 0).await.is_empty());

        clock.advance(1_100);
        let received = q.receive_messages(1, None, 0).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "m");
    }

    // Scenario 5: visibility expiry redelivers with incremented receiveCount,
    // and the stale handle is then invalid.
    #[tokio::test]
    async fn scenario_visibility_expiry_redelivers() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);

        q.send_message("m".into(), HashMap::new(), None, None, None)
            .unwrap();
        let first = q.receive_messages(1, Some(1), 0).await;
        let old_handle = first[0].receipt_handle.clone();

        clock.advance(1_100);
        let second = q.receive_messages(1, None, 0).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);

        assert!(matches!(
            q.delete_message(&old_handle),
            Err(SqsError::ReceiptHandleIsInvalid(_))
        ));
    }

    #[tokio::test]
    async fn change_visibility_zero_makes_message_immediately_eligible() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);

        q.send_message("m".into(), HashMap::new(), None, None, None)
            .unwrap();
        let received = q.receive_messages(1, None, 0).await;
        q.change_message_visibility(&received[0].receipt_handle, 0)
            .unwrap();

        let again = q.receive_messages(1, None, 0).await;
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn message_exactly_at_max_size_is_accepted_one_over_is_rejected() {
        let clock = TestClock::new(0);
        let mut attrs = QueueAttributes::default();
        attrs.maximum_message_size_bytes = 1024;
        let q = Queue::new("q".into(), attrs, Arc::new(clock.clone()) as Arc<dyn Clock>);

        let body_at_limit = "a".repeat(1024);
        assert!(q
            .send_message(body_at_limit, HashMap::new(), None, None, None)
            .is_ok());

        let body_over_limit = "a".repeat(1025);
        assert!(matches!(
            q.send_message(body_over_limit, HashMap::new(), None, None, None),
            Err(SqsError::MessageTooLong(_))
        ));
    }

    #[tokio::test]
    async fn fifo_requires_group_id() {
        let clock = TestClock::new(0);
        let q = queue(&clock, true, false);
        assert!(matches!(
            q.send_message("x".into(), HashMap::new(), None, None, None),
            Err(SqsError::MissingParameter(_))
        ));
    }

    #[tokio::test]
    async fn standard_queue_rejects_fifo_only_parameters() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);
        assert!(matches!(
            q.send_message("x".into(), HashMap::new(), None, Some("g".into()), None),
            Err(SqsError::InvalidParameterValue(_))
        ));
    }

    #[tokio::test]
    async fn statistics_partition_matches_total_message_count() {
        let clock = TestClock::new(0);
        let q = queue(&clock, false, false);
        q.send_message("a".into(), HashMap::new(), None, None, None).unwrap();
        q.send_message("b".into(), HashMap::new(), Some(60), None, None).unwrap();
        let received = q.receive_messages(1, None, 0).await;
        assert_eq!(received.len(), 1);

        let stats = q.statistics();
        assert_eq!(
            stats.approx_visible + stats.approx_inflight + stats.approx_delayed,
            2
        );
        assert_eq!(stats.approx_inflight, 1);
        assert_eq!(stats.approx_delayed, 1);
    }
}
