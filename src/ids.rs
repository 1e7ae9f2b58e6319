//! Opaque unique identifier generation for messages and receipt handles.

use uuid::Uuid;

/// An opaque, URL-safe message identifier, unique within its owning queue.
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// An opaque receipt handle authorizing delete/change-visibility on one
/// inflight message. A fresh handle is minted on every receive, including
/// re-receives of the same message after a prior handle's visibility expired.
pub fn generate_receipt_handle() -> String {
    Uuid::new_v4().to_string()
}
