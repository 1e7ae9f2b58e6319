//! Optional snapshot persistence (SPEC_FULL.md supplement): periodically
//! dumps queue contents to a JSON file and reloads them at startup, so a
//! restart doesn't silently lose in-flight work during local development.
//! Out of scope per spec.md's Non-goals is any guarantee across restarts;
//! this is a best-effort convenience, not a durability contract.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::sqs::attributes::QueueAttributes;
use crate::sqs::manager::QueueManager;
use crate::sqs::message::{Message, MessageState};
use crate::sqs::types::MessageAttributeValue;

#[derive(Serialize, Deserialize)]
struct SnapshotMessage {
    id: String,
    body: String,
    attributes: HashMap<String, MessageAttributeValue>,
    created_at: u64,
    receive_count: u32,
    visible_at: u64,
    order_index: u64,
    message_group_id: Option<String>,
    message_deduplication_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotQueue {
    name: String,
    fifo_queue: bool,
    content_based_deduplication: bool,
    visibility_timeout_millis: u32,
    delay_millis: u32,
    receive_message_wait_millis: u32,
    message_retention_millis: u64,
    maximum_message_size_bytes: u32,
    messages: Vec<SnapshotMessage>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    queues: Vec<SnapshotQueue>,
}

/// Writes the current state of every queue to `path`. Inflight messages are
/// snapshotted as immediately-visible Pending messages: a receipt handle is
/// only meaningful within the process that issued it, so resurrecting an
/// Inflight state across a restart would produce handles nothing can honor.
pub fn save(manager: &QueueManager, path: &PathBuf) -> std::io::Result<()> {
    let mut snapshot = Snapshot::default();
    for queue in manager.all_queues() {
        if queue.is_deleted() {
            continue;
        }
        let attrs = queue.get_attributes();
        let messages = queue.snapshot_messages();
        snapshot.queues.push(SnapshotQueue {
            name: queue.name.clone(),
            fifo_queue: attrs.fifo_queue,
            content_based_deduplication: attrs.content_based_deduplication,
            visibility_timeout_millis: attrs.visibility_timeout_millis,
            delay_millis: attrs.delay_millis,
            receive_message_wait_millis: attrs.receive_message_wait_millis,
            message_retention_millis: attrs.message_retention_millis,
            maximum_message_size_bytes: attrs.maximum_message_size_bytes,
            messages,
        });
    }
    let json = serde_json::to_vec_pretty(&snapshot)?;
    std::fs::write(path, json)
}

/// Loads a previously saved snapshot into `manager`, recreating queues and
/// re-inserting messages as Pending. Silently does nothing if `path` does
/// not exist, since a missing snapshot on first boot is the common case.
pub fn load(manager: &QueueManager, path: &PathBuf, clock: &Arc<dyn Clock>) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let bytes = std::fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

    for saved in snapshot.queues {
        let mut attrs = QueueAttributes::default();
        attrs.fifo_queue = saved.fifo_queue;
        attrs.content_based_deduplication = saved.content_based_deduplication;
        attrs.visibility_timeout_millis = saved.visibility_timeout_millis;
        attrs.delay_millis = saved.delay_millis;
        attrs.receive_message_wait_millis = saved.receive_message_wait_millis;
        attrs.message_retention_millis = saved.message_retention_millis;
        attrs.maximum_message_size_bytes = saved.maximum_message_size_bytes;

        let queue = manager
            .create_queue(saved.name, attrs)
            .expect("snapshot queue attributes were valid when saved");

        for m in saved.messages {
            queue.restore_message(Message {
                id: m.id,
                body: m.body,
                attributes: m.attributes,
                created_at: m.created_at,
                first_received_at: None,
                receive_count: m.receive_count,
                state: MessageState::Pending {
                    visible_at: m.visible_at,
                },
                order_index: m.order_index,
                message_group_id: m.message_group_id,
                message_deduplication_id: m.message_deduplication_id,
            });
        }
    }
    let _ = clock;
    Ok(())
}
