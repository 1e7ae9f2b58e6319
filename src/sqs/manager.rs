//! QueueManager (spec.md §4.6): the queue registry. Held behind a
//! short-lived RwLock so lookups never contend with the per-queue locks
//! that do the real work (spec.md §5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::Clock;
use crate::error::SqsError;
use crate::sqs::attributes::QueueAttributes;
use crate::sqs::queue::Queue;

pub struct QueueManager {
    clock: Arc<dyn Clock>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    base_url: String,
    region: String,
    account_id: String,
}

impl QueueManager {
    pub fn new(clock: Arc<dyn Clock>, base_url: String, region: String, account_id: String) -> Self {
        QueueManager {
            clock,
            queues: RwLock::new(HashMap::new()),
            base_url,
            region,
            account_id,
        }
    }

    pub fn queue_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    pub fn queue_arn(&self, name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{}", self.region, self.account_id, name)
    }

    fn name_from_url<'a>(&self, queue_url: &'a str) -> Result<&'a str, SqsError> {
        queue_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SqsError::QueueDoesNotExist(format!("Invalid queue URL: {queue_url}")))
    }

    fn validate_name(name: &str, fifo: bool) -> Result<(), SqsError> {
        let base_ok = !name.is_empty()
            && name.len() <= 80
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !base_ok {
            return Err(SqsError::InvalidParameterValue(
                "QueueName must be 1-80 characters: alphanumeric, hyphens, underscores".into(),
            ));
        }
        if fifo != name.ends_with(".fifo") {
            return Err(SqsError::InvalidParameterValue(
                "FIFO queue names must end with .fifo and only FIFO queue names may".into(),
            ));
        }
        Ok(())
    }

    /// Create-or-return-existing, idempotent when attributes match exactly
    /// (spec.md §4.6); `QueueAlreadyExists` when they don't.
    pub fn create_queue(
        &self,
        name: String,
        attributes: QueueAttributes,
    ) -> Result<Arc<Queue>, SqsError> {
        Self::validate_name(&name, attributes.fifo_queue)?;

        if let Some(existing) = self.queues.read().get(&name).cloned() {
            let current = existing.get_attributes();
            if attributes_equivalent(&current, &attributes) {
                return Ok(existing);
            }
            return Err(SqsError::QueueAlreadyExists(format!(
                "Queue {name} already exists with different attributes"
            )));
        }

        let queue = Arc::new(Queue::new(name.clone(), attributes, self.clock.clone()));
        let mut queues = self.queues.write();
        // Re-check: another writer may have created it between our read-lock
        // release and this write-lock acquire.
        if let Some(existing) = queues.get(&name).cloned() {
            return Ok(existing);
        }
        queues.insert(name.clone(), queue.clone());
        tracing::info!(queue = %name, "queue created");
        Ok(queue)
    }

    pub fn get_by_url(&self, queue_url: &str) -> Result<Arc<Queue>, SqsError> {
        let name = self.name_from_url(queue_url)?;
        self.queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SqsError::QueueDoesNotExist(format!("Queue {name} does not exist")))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<Queue>, SqsError> {
        self.queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SqsError::QueueDoesNotExist(format!("Queue {name} does not exist")))
    }

    pub fn delete_queue(&self, queue_url: &str) -> Result<(), SqsError> {
        let name = self.name_from_url(queue_url)?.to_string();
        let removed = self.queues.write().remove(&name);
        match removed {
            Some(queue) => {
                queue.mark_deleted();
                tracing::info!(queue = %name, "queue deleted");
                Ok(())
            }
            None => Err(SqsError::QueueDoesNotExist(format!(
                "Queue {name} does not exist"
            ))),
        }
    }

    pub fn list_queues(&self, prefix: Option<&str>) -> Vec<String> {
        let queues = self.queues.read();
        let mut names: Vec<&String> = queues
            .keys()
            .filter(|n| prefix.is_none_or(|p| n.starts_with(p)))
            .collect();
        names.sort();
        names.into_iter().map(|n| self.queue_url(n)).collect()
    }

    pub fn all_queues(&self) -> Vec<Arc<Queue>> {
        self.queues.read().values().cloned().collect()
    }
}

fn attributes_equivalent(a: &QueueAttributes, b: &QueueAttributes) -> bool {
    a.visibility_timeout_millis == b.visibility_timeout_millis
        && a.delay_millis == b.delay_millis
        && a.receive_message_wait_millis == b.receive_message_wait_millis
        && a.message_retention_millis == b.message_retention_millis
        && a.maximum_message_size_bytes == b.maximum_message_size_bytes
        && a.fifo_queue == b.fifo_queue
        && a.content_based_deduplication == b.content_based_deduplication
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn manager() -> QueueManager {
        QueueManager::new(
            Arc::new(TestClock::new(0)) as Arc<dyn Clock>,
            "http://localhost:9324/000000000000".into(),
            "us-east-1".into(),
            "000000000000".into(),
        )
    }

    #[test]
    fn create_is_idempotent_for_matching_attributes() {
        let mgr = manager();
        let a = mgr.create_queue("q".into(), QueueAttributes::default()).unwrap();
        let b = mgr.create_queue("q".into(), QueueAttributes::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn create_conflicts_on_differing_attributes() {
        let mgr = manager();
        mgr.create_queue("q".into(), QueueAttributes::default()).unwrap();
        let mut other = QueueAttributes::default();
        other.delay_millis = 5000;
        assert!(matches!(
            mgr.create_queue("q".into(), other),
            Err(SqsError::QueueAlreadyExists(_))
        ));
    }

    #[test]
    fn fifo_name_must_end_in_dot_fifo() {
        let mgr = manager();
        let mut attrs = QueueAttributes::default();
        attrs.fifo_queue = true;
        assert!(mgr.create_queue("q".into(), attrs).is_err());
    }

    #[test]
    fn delete_then_get_reports_not_found() {
        let mgr = manager();
        mgr.create_queue("q".into(), QueueAttributes::default()).unwrap();
        let url = mgr.queue_url("q");
        mgr.delete_queue(&url).unwrap();
        assert!(matches!(
            mgr.get_by_url(&url),
            Err(SqsError::QueueDoesNotExist(_))
        ));
    }

    #[test]
    fn list_queues_filters_by_prefix_and_sorts() {
        let mgr = manager();
        mgr.create_queue("bravo".into(), QueueAttributes::default()).unwrap();
        mgr.create_queue("alpha".into(), QueueAttributes::default()).unwrap();
        mgr.create_queue("other".into(), QueueAttributes::default()).unwrap();
        let urls = mgr.list_queues(Some("a"));
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("/alpha"));
    }
}
