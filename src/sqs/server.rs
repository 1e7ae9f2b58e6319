//! JSON 1.0 / X-Amz-Target HTTP adapter (spec.md §1: explicitly out of core
//! scope, kept only as the thin surface the core is driven through). Same
//! macro-dispatch shape as the teacher's other AWS service adapters.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::SqsError;
use crate::sqs::attributes::QueueAttributes;
use crate::sqs::manager::QueueManager;
use crate::sqs::types::*;

pub struct SqsService {
    manager: Arc<QueueManager>,
}

impl SqsService {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        SqsService { manager }
    }

    pub async fn create_queue(&self, req: CreateQueueRequest) -> Result<CreateQueueResponse, SqsError> {
        let mut attrs = QueueAttributes::default();
        if let Some(v) = req.attributes.get("FifoQueue") {
            attrs.fifo_queue = v == "true";
        }
        let mut rest = req.attributes.clone();
        rest.remove("FifoQueue");
        attrs.apply(&rest)?;

        let queue = self.manager.create_queue(req.queue_name, attrs)?;
        Ok(CreateQueueResponse {
            queue_url: self.manager.queue_url(&queue.name),
        })
    }

    pub async fn delete_queue(&self, req: DeleteQueueRequest) -> Result<(), SqsError> {
        self.manager.delete_queue(&req.queue_url)
    }

    pub async fn get_queue_url(&self, req: GetQueueUrlRequest) -> Result<GetQueueUrlResponse, SqsError> {
        let queue = self.manager.get_by_name(&req.queue_name)?;
        Ok(GetQueueUrlResponse {
            queue_url: self.manager.queue_url(&queue.name),
        })
    }

    pub async fn list_queues(&self, req: ListQueuesRequest) -> Result<ListQueuesResponse, SqsError> {
        Ok(ListQueuesResponse {
            queue_urls: self.manager.list_queues(req.queue_name_prefix.as_deref()),
        })
    }

    pub async fn get_queue_attributes(
        &self,
        req: GetQueueAttributesRequest,
    ) -> Result<GetQueueAttributesResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        let mut attributes = queue.get_attributes().to_map();
        attributes.insert("QueueArn".into(), self.manager.queue_arn(&queue.name));
        attributes.insert("CreatedTimestamp".into(), (queue.created_at / 1000).to_string());
        attributes.insert(
            "LastModifiedTimestamp".into(),
            (queue.last_modified_at() / 1000).to_string(),
        );
        let stats = queue.statistics();
        attributes.insert(
            "ApproximateNumberOfMessages".into(),
            stats.approx_visible.to_string(),
        );
        attributes.insert(
            "ApproximateNumberOfMessagesNotVisible".into(),
            stats.approx_inflight.to_string(),
        );
        attributes.insert(
            "ApproximateNumberOfMessagesDelayed".into(),
            stats.approx_delayed.to_string(),
        );

        if !req.attribute_names.is_empty() && !req.attribute_names.iter().any(|n| n == "All") {
            attributes.retain(|k, _| req.attribute_names.contains(k));
        }

        Ok(GetQueueAttributesResponse { attributes })
    }

    pub async fn set_queue_attributes(&self, req: SetQueueAttributesRequest) -> Result<(), SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        queue.update_attributes(&req.attributes)
    }

    pub async fn purge_queue(&self, req: PurgeQueueRequest) -> Result<(), SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        queue.purge()
    }

    pub async fn send_message(&self, req: SendMessageRequest) -> Result<SendMessageResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        let outcome = queue.send_message(
            req.message_body,
            req.message_attributes,
            req.delay_seconds,
            req.message_group_id,
            req.message_deduplication_id,
        )?;
        Ok(SendMessageResponse {
            message_id: outcome.message_id,
            md5_of_message_body: outcome.md5_of_message_body,
            md5_of_message_attributes: outcome.md5_of_message_attributes,
        })
    }

    pub async fn send_message_batch(
        &self,
        req: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        validate_batch(&req.entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>())?;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in req.entries {
            match queue.send_message(
                entry.message_body,
                entry.message_attributes,
                entry.delay_seconds,
                entry.message_group_id,
                entry.message_deduplication_id,
            ) {
                Ok(outcome) => successful.push(SendMessageBatchResultEntry {
                    id: entry.id,
                    message_id: outcome.message_id,
                    md5_of_message_body: outcome.md5_of_message_body,
                    md5_of_message_attributes: outcome.md5_of_message_attributes,
                }),
                Err(err) => failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                    sender_fault: true,
                }),
            }
        }
        Ok(SendMessageBatchResponse { successful, failed })
    }

    pub async fn receive_message(
        &self,
        req: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        let max = req.max_number_of_messages.clamp(1, 10) as usize;
        let wait_millis = req
            .wait_time_seconds
            .unwrap_or(queue.get_attributes().receive_message_wait_millis / 1000)
            .min(20) as u64
            * 1000;

        let received = queue
            .receive_messages(max, req.visibility_timeout, wait_millis as u32)
            .await;

        let messages = received
            .into_iter()
            .map(|m| {
                let mut attributes = HashMap::new();
                attributes.insert("SenderId".into(), "AIDACKCEVSQ6C2EXAMPLE".to_string());
                attributes.insert("SentTimestamp".into(), m.sent_timestamp.to_string());
                attributes.insert("ApproximateReceiveCount".into(), m.receive_count.to_string());
                attributes.insert(
                    "ApproximateFirstReceiveTimestamp".into(),
                    m.first_received_at.to_string(),
                );
                if let Some(ref group_id) = m.message_group_id {
                    attributes.insert("MessageGroupId".into(), group_id.clone());
                }
                if let Some(ref dedup_id) = m.message_deduplication_id {
                    attributes.insert("MessageDeduplicationId".into(), dedup_id.clone());
                }

                let message_attributes = if req.message_attribute_names.is_empty() {
                    HashMap::new()
                } else if req.message_attribute_names.iter().any(|n| n == "All") {
                    m.attributes.clone()
                } else {
                    m.attributes
                        .iter()
                        .filter(|(k, _)| req.message_attribute_names.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                };

                ReceivedMessageWire {
                    message_id: m.message_id,
                    receipt_handle: m.receipt_handle,
                    md5_of_body: m.md5_of_message_body,
                    body: m.body,
                    md5_of_message_attributes: m.md5_of_message_attributes,
                    message_attributes,
                    attributes,
                }
            })
            .collect();

        Ok(ReceiveMessageResponse { messages })
    }

    pub async fn delete_message(&self, req: DeleteMessageRequest) -> Result<(), SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        queue.delete_message(&req.receipt_handle)
    }

    pub async fn delete_message_batch(
        &self,
        req: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        validate_batch(&req.entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>())?;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in req.entries {
            match queue.delete_message(&entry.receipt_handle) {
                Ok(()) => successful.push(DeleteMessageBatchResultEntry { id: entry.id }),
                Err(err) => failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                    sender_fault: true,
                }),
            }
        }
        Ok(DeleteMessageBatchResponse { successful, failed })
    }

    pub async fn change_message_visibility(
        &self,
        req: ChangeMessageVisibilityRequest,
    ) -> Result<(), SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        queue.change_message_visibility(&req.receipt_handle, req.visibility_timeout * 1000)
    }

    pub async fn change_message_visibility_batch(
        &self,
        req: ChangeMessageVisibilityBatchRequest,
    ) -> Result<ChangeMessageVisibilityBatchResponse, SqsError> {
        let queue = self.manager.get_by_url(&req.queue_url)?;
        validate_batch(&req.entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>())?;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in req.entries {
            match queue.change_message_visibility(&entry.receipt_handle, entry.visibility_timeout * 1000) {
                Ok(()) => successful.push(ChangeMessageVisibilityBatchResultEntry { id: entry.id }),
                Err(err) => failed.push(BatchResultErrorEntry {
                    id: entry.id,
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                    sender_fault: true,
                }),
            }
        }
        Ok(ChangeMessageVisibilityBatchResponse { successful, failed })
    }
}

fn validate_batch(ids: &[String]) -> Result<(), SqsError> {
    if ids.is_empty() {
        return Err(SqsError::EmptyBatchRequest(
            "There should be at least one BatchEntry in the request".into(),
        ));
    }
    if ids.len() > 10 {
        return Err(SqsError::TooManyEntriesInBatchRequest(
            "Maximum number of entries per request is 10".into(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if id.is_empty() || id.len() > 80 || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(SqsError::InvalidBatchEntryId(format!(
                "Id {id} is invalid: must be 1-80 alphanumeric/hyphen/underscore characters"
            )));
        }
        if !seen.insert(id) {
            return Err(SqsError::BatchEntryIdsNotDistinct(format!(
                "Id {id} repeated in batch request"
            )));
        }
    }
    Ok(())
}

macro_rules! dispatch {
    ($service:expr, $body:expr, $req_type:ty, $method:ident) => {{
        let req: $req_type = serde_json::from_slice(&$body)
            .map_err(|e| SqsError::InvalidParameterValue(e.to_string()))?;
        let resp = $service.$method(req).await?;
        Ok(Json(serde_json::to_value(resp).unwrap()).into_response())
    }};
}

macro_rules! dispatch_empty {
    ($service:expr, $body:expr, $req_type:ty, $method:ident) => {{
        let req: $req_type = serde_json::from_slice(&$body)
            .map_err(|e| SqsError::InvalidParameterValue(e.to_string()))?;
        $service.$method(req).await?;
        Ok(Json(serde_json::json!({})).into_response())
    }};
}

async fn handle_request(
    State(service): State<Arc<SqsService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, SqsError> {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SqsError::InvalidAction("Missing X-Amz-Target header".into()))?;

    let action = target
        .strip_prefix("AmazonSQS.")
        .ok_or_else(|| SqsError::InvalidAction(format!("Invalid target: {target}")))?;

    match action {
        "CreateQueue" => dispatch!(service, body, CreateQueueRequest, create_queue),
        "DeleteQueue" => dispatch_empty!(service, body, DeleteQueueRequest, delete_queue),
        "GetQueueUrl" => dispatch!(service, body, GetQueueUrlRequest, get_queue_url),
        "ListQueues" => dispatch!(service, body, ListQueuesRequest, list_queues),
        "GetQueueAttributes" => {
            dispatch!(service, body, GetQueueAttributesRequest, get_queue_attributes)
        }
        "SetQueueAttributes" => {
            dispatch_empty!(service, body, SetQueueAttributesRequest, set_queue_attributes)
        }
        "PurgeQueue" => dispatch_empty!(service, body, PurgeQueueRequest, purge_queue),
        "SendMessage" => dispatch!(service, body, SendMessageRequest, send_message),
        "SendMessageBatch" => {
            dispatch!(service, body, SendMessageBatchRequest, send_message_batch)
        }
        "ReceiveMessage" => dispatch!(service, body, ReceiveMessageRequest, receive_message),
        "DeleteMessage" => dispatch_empty!(service, body, DeleteMessageRequest, delete_message),
        "DeleteMessageBatch" => {
            dispatch!(service, body, DeleteMessageBatchRequest, delete_message_batch)
        }
        "ChangeMessageVisibility" => {
            dispatch_empty!(
                service,
                body,
                ChangeMessageVisibilityRequest,
                change_message_visibility
            )
        }
        "ChangeMessageVisibilityBatch" => {
            dispatch!(
                service,
                body,
                ChangeMessageVisibilityBatchRequest,
                change_message_visibility_batch
            )
        }
        _ => Err(SqsError::InvalidAction(format!("Unknown action: {action}"))),
    }
}

pub fn create_router(service: Arc<SqsService>) -> Router {
    Router::new()
        .route("/", post(handle_request))
        .with_state(service)
}
