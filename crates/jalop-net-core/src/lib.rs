//! # JALoP Net Core
//!
//! Pure primitives for JALoP record synchronization: identifiers, reason
//! codes, digest algorithms and record framing.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`RecordType`] / [`Mode`] / [`Role`] - What a channel carries and how
//! - [`RecordId`] / [`PublisherId`] / [`SessionId`] - Identifiers
//! - [`ErrorCode`] - Stable reason tokens peers key behavior off
//! - [`DigestAlgorithmRegistry`] - Which digests this side supports and selects
//! - [`RecordCodec`] - Streams a record's three segments and digests them
//!
//! ## Framing
//!
//! Records are three segments, each followed by `BREAK`. See [`codec`].

pub mod codec;
pub mod codes;
pub mod digest;
pub mod error;
pub mod types;

pub use codec::{
    frame_record, record_digest, CodecOutcome, Feed, RecordCodec, RecordEnvelope, RecordHeaders,
    RecordLengths, RecordPart, SegmentChunk, AUDIT_FORMAT_XML, BREAK_MARKER,
};
pub use codes::ErrorCode;
pub use digest::{
    DigestAlgorithm, DigestAlgorithmRegistry, DigestStatus, DigestValue, RecordDigester,
};
pub use error::{CoreError, RecordRejection};
pub use types::{Mode, PublisherId, RecordId, RecordType, Role, SessionId};
