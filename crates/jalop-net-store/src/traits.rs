//! RecordStore trait: the abstract interface for record persistence.
//!
//! Records are written into a temporary namespace keyed by publisher and
//! record type, then moved into a confirmed namespace once the peer agrees
//! on the digest. Implementations include the filesystem (primary) and
//! in-memory (for tests).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use jalop_net_core::{PublisherId, RecordId, RecordLengths, RecordPart, RecordType};

use crate::error::Result;
use crate::status::RecordStatus;

/// Location of a record in temporary storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordSlot {
    pub publisher_id: PublisherId,
    pub record_type: RecordType,
    /// Monotonically increasing per (publisher, type).
    pub seq: u64,
}

impl fmt::Display for RecordSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:010}", self.publisher_id, self.record_type, self.seq)
    }
}

/// A record found in temporary storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempRecord {
    pub slot: RecordSlot,
    /// `None` when the status marker is absent or unreadable.
    pub status: Option<RecordStatus>,
    /// Payload bytes actually on storage.
    pub payload_len: u64,
}

impl TempRecord {
    pub fn record_id(&self) -> Option<&RecordId> {
        self.status.as_ref().map(|s| &s.record_id)
    }
}

/// A record relocated into the confirmed namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub record_type: RecordType,
    /// Sequence number in the confirmed namespace.
    pub seq: u64,
    pub record_id: RecordId,
}

/// The RecordStore trait: async interface for record persistence.
///
/// # Design Notes
///
/// - **Marker first**: `create` writes the status marker before any byte.
/// - **Move on confirm**: `confirm` relocates the record; the temporary
///   namespace no longer contains it afterward.
/// - **Ordered backlog**: `list_temp` returns records in sequence order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Temporary Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Allocate a new temporary record and write its status marker.
    ///
    /// # Arguments
    /// - `publisher_id`, `record_type`: the namespace.
    /// - `record_id`: the peer's identifier for the record.
    /// - `declared`: the declared segment lengths.
    ///
    /// # Returns
    /// The slot of the new record, with the next sequence number.
    async fn create(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
        declared: RecordLengths,
    ) -> Result<RecordSlot>;

    /// Append bytes to one segment and record the progress in the marker.
    ///
    /// # Returns
    /// Total bytes now stored for that segment.
    async fn append(&self, slot: &RecordSlot, part: RecordPart, bytes: &[u8]) -> Result<u64>;

    /// Read the status marker. `None` if absent or unreadable.
    async fn status(&self, slot: &RecordSlot) -> Result<Option<RecordStatus>>;

    /// Overwrite the status marker.
    async fn write_status(&self, slot: &RecordSlot, status: &RecordStatus) -> Result<()>;

    /// Read the stored payload bytes.
    async fn read_payload(&self, slot: &RecordSlot) -> Result<Vec<u8>>;

    /// Delete stored system and application metadata, keeping the payload.
    async fn clear_metadata(&self, slot: &RecordSlot) -> Result<()>;

    /// List temporary records for a namespace, in sequence order.
    async fn list_temp(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Vec<TempRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Outcomes
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a record from temporary to confirmed storage.
    async fn confirm(&self, slot: &RecordSlot) -> Result<ConfirmedRecord>;

    /// Delete a temporary record. Deleting a missing record is a no-op.
    async fn delete(&self, slot: &RecordSlot) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Confirmed Records
    // ─────────────────────────────────────────────────────────────────────────

    /// The last record id confirmed for a namespace.
    async fn last_confirmed(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Option<RecordId>>;

    /// All confirmed records of a type, in confirmed sequence order.
    async fn list_confirmed(&self, record_type: RecordType) -> Result<Vec<ConfirmedRecord>>;
}

/// Extension trait for common store patterns.
pub trait RecordStoreExt: RecordStore {
    /// Find the temporary record carrying `record_id`.
    fn find_temp(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
    ) -> impl std::future::Future<Output = Result<Option<TempRecord>>> + Send;
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {
    async fn find_temp(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
    ) -> Result<Option<TempRecord>> {
        let records = self.list_temp(publisher_id, record_type).await?;
        Ok(records
            .into_iter()
            .find(|r| r.record_id() == Some(record_id)))
    }
}
