//! SQS error codes (spec.md §6), one variant per wire error code.
//!
//! The HTTP mapping stays the teacher's shape (`{"__type": ..., "message":
//! ...}` JSON body with a per-code status) since that adapter surface is
//! explicitly out of core scope; only the derivation mechanism changes
//! (`thiserror` instead of hand-rolled `message()`/`error_code()` matches).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SqsError {
    #[error("{0}")]
    QueueAlreadyExists(String),
    #[error("{0}")]
    QueueDoesNotExist(String),
    #[error("{0}")]
    InvalidAttributeName(String),
    #[error("{0}")]
    InvalidAttributeValue(String),
    #[error("{0}")]
    InvalidParameterValue(String),
    #[error("{0}")]
    MissingParameter(String),
    #[error("{0}")]
    ReceiptHandleIsInvalid(String),
    #[error("{0}")]
    MessageTooLong(String),
    #[error("{0}")]
    BatchEntryIdsNotDistinct(String),
    #[error("{0}")]
    EmptyBatchRequest(String),
    #[error("{0}")]
    TooManyEntriesInBatchRequest(String),
    #[error("{0}")]
    InvalidBatchEntryId(String),
    #[error("{0}")]
    InvalidAction(String),
}

impl SqsError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SqsError::QueueAlreadyExists(_) => "QueueAlreadyExists",
            SqsError::QueueDoesNotExist(_) => "QueueDoesNotExist",
            SqsError::InvalidAttributeName(_) => "InvalidAttributeName",
            SqsError::InvalidAttributeValue(_) => "InvalidAttributeValue",
            SqsError::InvalidParameterValue(_) => "InvalidParameterValue",
            SqsError::MissingParameter(_) => "MissingParameter",
            SqsError::ReceiptHandleIsInvalid(_) => "ReceiptHandleIsInvalid",
            SqsError::MessageTooLong(_) => "MessageTooLong",
            SqsError::BatchEntryIdsNotDistinct(_) => "BatchEntryIdsNotDistinct",
            SqsError::EmptyBatchRequest(_) => "EmptyBatchRequest",
            SqsError::TooManyEntriesInBatchRequest(_) => "TooManyEntriesInBatchRequest",
            SqsError::InvalidBatchEntryId(_) => "InvalidBatchEntryId",
            SqsError::InvalidAction(_) => "InvalidAction",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            SqsError::QueueAlreadyExists(_) => StatusCode::CONFLICT,
            SqsError::QueueDoesNotExist(_) => StatusCode::BAD_REQUEST,
            SqsError::InvalidAction(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for SqsError {
    fn into_response(self) -> Response {
        tracing::warn!(code = self.error_code(), message = %self, "request failed");
        let body = json!({
            "__type": format!("com.amazonaws.sqs#{}", self.error_code()),
            "message": self.to_string(),
        });
        (self.status_code(), axum::Json(body)).into_response()
    }
}
