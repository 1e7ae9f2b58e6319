//! DelayDispatcher (spec.md §4.7): a background tick that sweeps every
//! queue's VisibilityScheduler and dedup index, so a queue nobody is
//! actively polling still makes its delayed/expired messages visible.
//!
//! Mirrors the teacher's `start_message_move_task` pattern of a detached
//! `tokio::spawn` loop driven by a fixed tick, rather than arming a precise
//! per-message timer.

use std::sync::Arc;
use std::time::Duration;

use crate::sqs::manager::QueueManager;

pub fn spawn(manager: Arc<QueueManager>, tick: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            for queue in manager.all_queues() {
                queue.sweep();
            }
        }
    })
}
