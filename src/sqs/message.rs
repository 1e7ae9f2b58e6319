//! The Message type and its lifecycle state (spec.md §3).

use std::collections::HashMap;

use crate::sqs::types::MessageAttributeValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageState {
    /// Waiting to become visible at `visible_at` (epoch millis).
    Pending { visible_at: u64 },
    /// Held by a receiver until `visibility_deadline`, under `receipt_handle`.
    Inflight {
        receipt_handle: String,
        visibility_deadline: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub attributes: HashMap<String, MessageAttributeValue>,
    pub created_at: u64,
    pub first_received_at: Option<u64>,
    pub receive_count: u32,
    pub state: MessageState,
    /// Per-queue monotonically increasing arrival sequence; ties broken by
    /// arrival order. Used for FIFO strict ordering and, incidentally, as a
    /// stable "oldest first" approximation for Standard queues.
    pub order_index: u64,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

impl Message {
    pub fn is_pending_and_visible(&self, now: u64) -> bool {
        matches!(self.state, MessageState::Pending { visible_at } if visible_at <= now)
    }

    pub fn is_inflight(&self) -> bool {
        matches!(self.state, MessageState::Inflight { .. })
    }

    pub fn receipt_handle(&self) -> Option<&str> {
        match &self.state {
            MessageState::Inflight { receipt_handle, .. } => Some(receipt_handle),
            MessageState::Pending { .. } => None,
        }
    }
}
