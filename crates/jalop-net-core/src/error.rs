//! Error types for the core crate.

use thiserror::Error;

use crate::codes::ErrorCode;
use crate::types::RecordId;

/// Core errors: local faults in pure computation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown digest algorithm: {0}")]
    UnknownDigest(String),

    #[error("codec misuse: {0}")]
    CodecState(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// A record refused before any byte was accepted.
///
/// `record_id` is empty when the id itself was missing; responses echo `""`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {record_id:?} rejected: {code}")]
pub struct RecordRejection {
    pub record_id: RecordId,
    pub code: ErrorCode,
}

impl RecordRejection {
    pub fn new(record_id: RecordId, code: ErrorCode) -> Self {
        Self { record_id, code }
    }
}
