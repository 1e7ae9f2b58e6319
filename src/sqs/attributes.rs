//! Queue attributes: the get/set surface of spec.md §6, validated per the
//! bounds in spec.md §3.

use std::collections::HashMap;

use crate::error::SqsError;

#[derive(Debug, Clone)]
pub struct QueueAttributes {
    pub visibility_timeout_millis: u32,
    pub delay_millis: u32,
    pub receive_message_wait_millis: u32,
    pub message_retention_millis: u64,
    pub maximum_message_size_bytes: u32,
    pub fifo_queue: bool,
    pub content_based_deduplication: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        QueueAttributes {
            visibility_timeout_millis: 30_000,
            delay_millis: 0,
            receive_message_wait_millis: 0,
            message_retention_millis: 345_600_000,
            maximum_message_size_bytes: 262_144,
            fifo_queue: false,
            content_based_deduplication: false,
        }
    }
}

impl QueueAttributes {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert(
            "VisibilityTimeout".into(),
            (self.visibility_timeout_millis / 1000).to_string(),
        );
        m.insert(
            "DelaySeconds".into(),
            (self.delay_millis / 1000).to_string(),
        );
        m.insert(
            "ReceiveMessageWaitTimeSeconds".into(),
            (self.receive_message_wait_millis / 1000).to_string(),
        );
        m.insert(
            "MessageRetentionPeriod".into(),
            (self.message_retention_millis / 1000).to_string(),
        );
        m.insert(
            "MaximumMessageSize".into(),
            self.maximum_message_size_bytes.to_string(),
        );
        m.insert("FifoQueue".into(), self.fifo_queue.to_string());
        if self.fifo_queue {
            m.insert(
                "ContentBasedDeduplication".into(),
                self.content_based_deduplication.to_string(),
            );
        }
        m
    }

    /// Applies a set of attribute updates. `FifoQueue` must be stripped by
    /// the caller before this is used for `SetQueueAttributes` — it is
    /// read-only after creation (spec.md §6).
    pub fn apply(&mut self, attrs: &HashMap<String, String>) -> Result<(), SqsError> {
        for (key, value) in attrs {
            match key.as_str() {
                "VisibilityTimeout" => {
                    let secs: u32 = parse_u32(value, "VisibilityTimeout")?;
                    if secs > 43_200 {
                        return Err(SqsError::InvalidAttributeValue(
                            "VisibilityTimeout must be between 0 and 43200 seconds".into(),
                        ));
                    }
                    self.visibility_timeout_millis = secs * 1000;
                }
                "DelaySeconds" => {
                    let secs: u32 = parse_u32(value, "DelaySeconds")?;
                    if secs > 900 {
                        return Err(SqsError::InvalidAttributeValue(
                            "DelaySeconds must be between 0 and 900".into(),
                        ));
                    }
                    self.delay_millis = secs * 1000;
                }
                "ReceiveMessageWaitTimeSeconds" => {
                    let secs: u32 = parse_u32(value, "ReceiveMessageWaitTimeSeconds")?;
                    if secs > 20 {
                        return Err(SqsError::InvalidAttributeValue(
                            "ReceiveMessageWaitTimeSeconds must be between 0 and 20".into(),
                        ));
                    }
                    self.receive_message_wait_millis = secs * 1000;
                }
                "MessageRetentionPeriod" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!(
                            "Invalid MessageRetentionPeriod: {value}"
                        ))
                    })?;
                    if !(60..=1_209_600).contains(&secs) {
                        return Err(SqsError::InvalidAttributeValue(
                            "MessageRetentionPeriod must be between 60 and 1209600 seconds".into(),
                        ));
                    }
                    self.message_retention_millis = secs * 1000;
                }
                "MaximumMessageSize" => {
                    let bytes: u32 = parse_u32(value, "MaximumMessageSize")?;
                    if !(1_024..=262_144).contains(&bytes) {
                        return Err(SqsError::InvalidAttributeValue(
                            "MaximumMessageSize must be between 1024 and 262144 bytes".into(),
                        ));
                    }
                    self.maximum_message_size_bytes = bytes;
                }
                "ContentBasedDeduplication" => {
                    if !self.fifo_queue {
                        return Err(SqsError::InvalidAttributeName(
                            "ContentBasedDeduplication only applies to FIFO queues".into(),
                        ));
                    }
                    self.content_based_deduplication = value == "true";
                }
                "FifoQueue" => {
                    return Err(SqsError::InvalidAttributeName(
                        "FifoQueue cannot be changed after queue creation".into(),
                    ));
                }
                other => {
                    return Err(SqsError::InvalidAttributeName(format!(
                        "Unknown attribute: {other}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_u32(value: &str, name: &str) -> Result<u32, SqsError> {
    value
        .parse()
        .map_err(|_| SqsError::InvalidAttributeValue(format!("Invalid {name}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let attrs = QueueAttributes::default();
        assert_eq!(attrs.visibility_timeout_millis, 30_000);
        assert_eq!(attrs.delay_millis, 0);
        assert_eq!(attrs.receive_message_wait_millis, 0);
        assert_eq!(attrs.message_retention_millis, 345_600_000);
        assert_eq!(attrs.maximum_message_size_bytes, 262_144);
        assert!(!attrs.fifo_queue);
    }

    #[test]
    fn rejects_out_of_range_visibility_timeout() {
        let mut attrs = QueueAttributes::default();
        let mut update = HashMap::new();
        update.insert("VisibilityTimeout".to_string(), "43201".to_string());
        assert!(attrs.apply(&update).is_err());
    }

    #[test]
    fn fifo_queue_attribute_is_immutable() {
        let mut attrs = QueueAttributes::default();
        let mut update = HashMap::new();
        update.insert("FifoQueue".to_string(), "true".to_string());
        assert!(matches!(
            attrs.apply(&update),
            Err(SqsError::InvalidAttributeName(_))
        ));
    }

    #[test]
    fn content_based_dedup_requires_fifo() {
        let mut attrs = QueueAttributes::default();
        let mut update = HashMap::new();
        update.insert("ContentBasedDeduplication".to_string(), "true".to_string());
        assert!(attrs.apply(&update).is_err());
    }
}
