//! In-memory implementation of the RecordStore trait.
//!
//! This is primarily for testing. It has the same semantics as the
//! filesystem store but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use jalop_net_core::{PublisherId, RecordId, RecordLengths, RecordPart, RecordType};

use crate::error::{Result, StoreError};
use crate::status::RecordStatus;
use crate::traits::{ConfirmedRecord, RecordSlot, RecordStore, TempRecord};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped.
pub struct MemoryRecordStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Temporary records by slot.
    temp: BTreeMap<RecordSlot, StoredRecord>,

    /// Next temporary sequence per namespace.
    next_temp_seq: HashMap<(PublisherId, RecordType), u64>,

    /// Confirmed records by (type, seq).
    confirmed: BTreeMap<(RecordType, u64), StoredRecord>,

    /// Last confirmed id per namespace.
    last_confirmed: HashMap<(PublisherId, RecordType), RecordId>,
}

#[derive(Clone)]
struct StoredRecord {
    status: Option<RecordStatus>,
    parts: [Vec<u8>; 3],
}

fn part_index(part: RecordPart) -> usize {
    match part {
        RecordPart::SystemMetadata => 0,
        RecordPart::ApplicationMetadata => 1,
        RecordPart::Payload => 2,
    }
}

impl MemoryRecordStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Drop a record's status marker, leaving its bytes in place.
    ///
    /// Simulates a crash between writing payload bytes and the marker.
    pub async fn drop_status(&self, slot: &RecordSlot) {
        if let Some(record) = self.inner.write().await.temp.get_mut(slot) {
            record.status = None;
        }
    }

    /// Read one stored segment of a temporary record.
    pub async fn read_part(&self, slot: &RecordSlot, part: RecordPart) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .temp
            .get(slot)
            .map(|r| r.parts[part_index(part)].clone())
    }

    /// Read one stored segment of a confirmed record.
    pub async fn read_confirmed_part(
        &self,
        record_type: RecordType,
        seq: u64,
        part: RecordPart,
    ) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .confirmed
            .get(&(record_type, seq))
            .map(|r| r.parts[part_index(part)].clone())
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
        declared: RecordLengths,
    ) -> Result<RecordSlot> {
        let mut inner = self.inner.write().await;

        let next = inner
            .next_temp_seq
            .entry((*publisher_id, record_type))
            .or_insert(1);
        let seq = *next;
        *next += 1;

        let slot = RecordSlot {
            publisher_id: *publisher_id,
            record_type,
            seq,
        };
        inner.temp.insert(
            slot,
            StoredRecord {
                status: Some(RecordStatus::new(record_id.clone(), declared)),
                parts: Default::default(),
            },
        );
        Ok(slot)
    }

    async fn append(&self, slot: &RecordSlot, part: RecordPart, bytes: &[u8]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let record = inner
            .temp
            .get_mut(slot)
            .ok_or_else(|| StoreError::NotFound(slot.to_string()))?;

        let stored = &mut record.parts[part_index(part)];
        stored.extend_from_slice(bytes);
        let total = stored.len() as u64;
        if let Some(status) = record.status.as_mut() {
            status.progress.set(part, total);
        }
        Ok(total)
    }

    async fn status(&self, slot: &RecordSlot) -> Result<Option<RecordStatus>> {
        let inner = self.inner.read().await;
        Ok(inner.temp.get(slot).and_then(|r| r.status.clone()))
    }

    async fn write_status(&self, slot: &RecordSlot, status: &RecordStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .temp
            .get_mut(slot)
            .ok_or_else(|| StoreError::NotFound(slot.to_string()))?;
        record.status = Some(status.clone());
        Ok(())
    }

    async fn read_payload(&self, slot: &RecordSlot) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .temp
            .get(slot)
            .map(|r| r.parts[part_index(RecordPart::Payload)].clone())
            .ok_or_else(|| StoreError::NotFound(slot.to_string()))
    }

    async fn clear_metadata(&self, slot: &RecordSlot) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .temp
            .get_mut(slot)
            .ok_or_else(|| StoreError::NotFound(slot.to_string()))?;
        record.parts[part_index(RecordPart::SystemMetadata)].clear();
        record.parts[part_index(RecordPart::ApplicationMetadata)].clear();
        if let Some(status) = record.status.as_mut() {
            status.progress.system_metadata = 0;
            status.progress.application_metadata = 0;
        }
        Ok(())
    }

    async fn list_temp(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Vec<TempRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .temp
            .iter()
            .filter(|(slot, _)| slot.publisher_id == *publisher_id && slot.record_type == record_type)
            .map(|(slot, record)| TempRecord {
                slot: *slot,
                status: record.status.clone(),
                payload_len: record.parts[part_index(RecordPart::Payload)].len() as u64,
            })
            .collect())
    }

    async fn confirm(&self, slot: &RecordSlot) -> Result<ConfirmedRecord> {
        let mut inner = self.inner.write().await;
        let mut record = inner
            .temp
            .remove(slot)
            .ok_or_else(|| StoreError::NotFound(slot.to_string()))?;

        let record_id = record
            .status
            .as_ref()
            .map(|s| s.record_id.clone())
            .ok_or_else(|| StoreError::InvalidData(format!("{} has no status marker", slot)))?;
        if let Some(status) = record.status.as_mut() {
            status.confirmed = true;
        }

        let seq = inner
            .confirmed
            .range((slot.record_type, 0)..=(slot.record_type, u64::MAX))
            .next_back()
            .map(|((_, seq), _)| seq + 1)
            .unwrap_or(1);

        inner.confirmed.insert((slot.record_type, seq), record);
        inner
            .last_confirmed
            .insert((slot.publisher_id, slot.record_type), record_id.clone());

        Ok(ConfirmedRecord {
            record_type: slot.record_type,
            seq,
            record_id,
        })
    }

    async fn delete(&self, slot: &RecordSlot) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.temp.remove(slot);
        Ok(())
    }

    async fn last_confirmed(
        &self,
        publisher_id: &PublisherId,
        record_type: RecordType,
    ) -> Result<Option<RecordId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .last_confirmed
            .get(&(*publisher_id, record_type))
            .cloned())
    }

    async fn list_confirmed(&self, record_type: RecordType) -> Result<Vec<ConfirmedRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .confirmed
            .range((record_type, 0)..=(record_type, u64::MAX))
            .filter_map(|((_, seq), record)| {
                record.status.as_ref().map(|s| ConfirmedRecord {
                    record_type,
                    seq: *seq,
                    record_id: s.record_id.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> PublisherId {
        PublisherId::parse("ae8a54d7-dd7c-4c50-a7e7-f948a140c556").unwrap()
    }

    fn lengths() -> RecordLengths {
        RecordLengths {
            system_metadata: 3,
            application_metadata: 0,
            payload: 4,
        }
    }

    #[tokio::test]
    async fn test_memory_store_create_and_append() {
        let store = MemoryRecordStore::new();
        let slot = store
            .create(&publisher(), RecordType::Log, &RecordId::from("a"), lengths())
            .await
            .unwrap();
        assert_eq!(slot.seq, 1);

        store.append(&slot, RecordPart::Payload, b"ab").await.unwrap();
        let total = store.append(&slot, RecordPart::Payload, b"cd").await.unwrap();
        assert_eq!(total, 4);

        let status = store.status(&slot).await.unwrap().unwrap();
        assert_eq!(status.progress.payload, 4);
        assert_eq!(store.read_payload(&slot).await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_memory_store_confirm_moves_record() {
        let store = MemoryRecordStore::new();
        let slot = store
            .create(&publisher(), RecordType::Audit, &RecordId::from("a"), lengths())
            .await
            .unwrap();
        store.append(&slot, RecordPart::Payload, b"data").await.unwrap();

        let confirmed = store.confirm(&slot).await.unwrap();
        assert_eq!(confirmed.seq, 1);
        assert!(store
            .list_temp(&publisher(), RecordType::Audit)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.last_confirmed(&publisher(), RecordType::Audit).await.unwrap(),
            Some(RecordId::from("a"))
        );
        assert_eq!(
            store
                .read_confirmed_part(RecordType::Audit, 1, RecordPart::Payload)
                .await,
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn test_memory_store_sequences_are_monotonic() {
        let store = MemoryRecordStore::new();
        let mut seqs = Vec::new();
        for id in ["a", "b", "c"] {
            let slot = store
                .create(&publisher(), RecordType::Journal, &RecordId::from(id), lengths())
                .await
                .unwrap();
            seqs.push(slot.seq);
        }
        store
            .delete(&RecordSlot {
                publisher_id: publisher(),
                record_type: RecordType::Journal,
                seq: 3,
            })
            .await
            .unwrap();
        let next = store
            .create(&publisher(), RecordType::Journal, &RecordId::from("d"), lengths())
            .await
            .unwrap();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(next.seq, 4);
    }
}
