//! MD5/SHA-256 digest utilities used for response digests and content-based
//! FIFO deduplication. Out of core scope per spec.md §1 ("digest
//! utilities... treated as thin adapters"); kept as free functions so the
//! core can call them without depending on any HTTP/XML concern.

use std::collections::HashMap;

use md5::{Digest as Md5Digest, Md5};
use sha2::Sha256;

use crate::sqs::types::MessageAttributeValue;

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// MD5OfMessageAttributes per spec.md §6: for each attribute sorted by
/// name, a length-prefixed name, length-prefixed DataType, a type tag byte
/// (1 = String/Number, 2 = Binary), and length-prefixed value bytes.
pub fn md5_of_attributes(attrs: &HashMap<String, MessageAttributeValue>) -> Option<String> {
    if attrs.is_empty() {
        return None;
    }
    let mut keys: Vec<&String> = attrs.keys().collect();
    keys.sort();

    let mut buf: Vec<u8> = Vec::new();
    for key in keys {
        let attr = &attrs[key];

        let name_bytes = key.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(name_bytes);

        let dt_bytes = attr.data_type.as_bytes();
        buf.extend_from_slice(&(dt_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(dt_bytes);

        if attr.data_type.starts_with("Binary") {
            buf.push(2);
            if let Some(ref bv) = attr.binary_value {
                let decoded =
                    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, bv)
                        .unwrap_or_default();
                buf.extend_from_slice(&(decoded.len() as u32).to_be_bytes());
                buf.extend_from_slice(&decoded);
            }
        } else {
            buf.push(1);
            if let Some(ref sv) = attr.string_value {
                let sv_bytes = sv.as_bytes();
                buf.extend_from_slice(&(sv_bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(sv_bytes);
            }
        }
    }

    Some(md5_hex(&buf))
}
