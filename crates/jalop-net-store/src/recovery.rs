//! Journal recovery: resume, restart or purge partially received journals.
//!
//! Decisions are made from what is actually in temporary storage. A
//! record whose status marker is missing or unreadable is corrupt and is
//! purged, never resumed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use jalop_net_core::{PublisherId, RecordId, RecordLengths, RecordType, SessionId};

use crate::error::Result;
use crate::status::RecordStatus;
use crate::traits::{ConfirmedRecord, RecordSlot, RecordStore, TempRecord};

/// A journal record that can continue from a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeState {
    pub slot: RecordSlot,
    pub record_id: RecordId,
    /// Payload bytes already stored.
    pub offset: u64,
    /// Full payload length declared by the original transfer.
    pub original_length: u64,
}

impl ResumeState {
    /// Payload bytes the peer still has to send.
    pub fn remaining(&self) -> u64 {
        self.original_length.saturating_sub(self.offset)
    }
}

/// Why a temporary journal record cannot be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unresumable {
    NoStatus,
    AlreadyConfirmed,
    NoPayload,
    FullyUploaded,
    NotFirst,
}

/// Resume and purge policy over a record store.
///
/// Every slot a live session writes to is claimed by that session. Resume,
/// backlog discard and the journal-missing cascade only ever act on slots
/// that are unclaimed or claimed by the caller. Clones share one claim
/// table.
pub struct JournalRecoveryPolicy<S: RecordStore> {
    store: Arc<S>,
    claims: Arc<RwLock<HashMap<RecordSlot, SessionId>>>,
}

impl<S: RecordStore> Clone for JournalRecoveryPolicy<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            claims: Arc::clone(&self.claims),
        }
    }
}

impl<S: RecordStore> JournalRecoveryPolicy<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            claims: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn classify(
        record: &TempRecord,
        first: bool,
    ) -> std::result::Result<&RecordStatus, Unresumable> {
        let status = record.status.as_ref().ok_or(Unresumable::NoStatus)?;
        if status.confirmed {
            return Err(Unresumable::AlreadyConfirmed);
        }
        if !first {
            return Err(Unresumable::NotFirst);
        }
        if record.payload_len == 0 {
            return Err(Unresumable::NoPayload);
        }
        if record.payload_len >= status.declared.payload {
            return Err(Unresumable::FullyUploaded);
        }
        Ok(status)
    }

    /// Temporary journals of a publisher that `owner` may act on.
    async fn visible_journals(
        &self,
        claims: &HashMap<RecordSlot, SessionId>,
        publisher_id: &PublisherId,
        owner: &SessionId,
    ) -> Result<Vec<TempRecord>> {
        let records = self.store.list_temp(publisher_id, RecordType::Journal).await?;
        Ok(records
            .into_iter()
            .filter(|r| claims.get(&r.slot).map_or(true, |o| o == owner))
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Claims
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a temporary record claimed by `owner`.
    ///
    /// Creation and claim happen under the claim lock, so a concurrent
    /// recovery pass never sees the slot unclaimed.
    pub async fn open_record(
        &self,
        owner: SessionId,
        publisher_id: &PublisherId,
        record_type: RecordType,
        record_id: &RecordId,
        declared: RecordLengths,
    ) -> Result<RecordSlot> {
        let mut claims = self.claims.write().await;
        let slot = self
            .store
            .create(publisher_id, record_type, record_id, declared)
            .await?;
        claims.insert(slot, owner);
        Ok(slot)
    }

    /// The session holding a slot, if any.
    pub async fn owner(&self, slot: &RecordSlot) -> Option<SessionId> {
        self.claims.read().await.get(slot).copied()
    }

    /// Give up a slot without touching its data.
    pub async fn release(&self, slot: &RecordSlot) {
        self.claims.write().await.remove(slot);
    }

    /// Give up every slot held by a session.
    ///
    /// # Returns
    /// The number of slots released.
    pub async fn release_owner(&self, owner: &SessionId) -> usize {
        let mut claims = self.claims.write().await;
        let before = claims.len();
        claims.retain(|_, o| o != owner);
        before - claims.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Find the journal record this publisher may resume, and claim it for
    /// `owner`.
    ///
    /// Only the oldest unclaimed temporary journal record is a candidate.
    /// It must have a readable status marker and a payload that is
    /// non-empty but shorter than declared. The candidate's stored metadata
    /// is deleted; the resumed transfer writes it again. Every other
    /// unclaimed temporary journal record for the publisher is purged.
    /// Records held by other live sessions are left alone.
    pub async fn find_resumable(
        &self,
        publisher_id: &PublisherId,
        owner: SessionId,
    ) -> Result<Option<ResumeState>> {
        let mut claims = self.claims.write().await;
        let records = self.visible_journals(&claims, publisher_id, &owner).await?;
        let mut resume = None;

        for (idx, record) in records.iter().enumerate() {
            match Self::classify(record, idx == 0) {
                Ok(status) => {
                    self.store.clear_metadata(&record.slot).await?;
                    let mut status = status.clone();
                    status.progress.system_metadata = 0;
                    status.progress.application_metadata = 0;
                    status.progress.payload = record.payload_len;
                    status.digest = None;
                    self.store.write_status(&record.slot, &status).await?;
                    claims.insert(record.slot, owner);

                    tracing::info!(
                        publisher_id = %publisher_id,
                        record_id = %status.record_id,
                        offset = record.payload_len,
                        "journal record resumable"
                    );
                    resume = Some(ResumeState {
                        slot: record.slot,
                        record_id: status.record_id,
                        offset: record.payload_len,
                        original_length: status.declared.payload,
                    });
                }
                Err(reason) => {
                    tracing::warn!(
                        slot = %record.slot,
                        reason = ?reason,
                        "purging unresumable journal record"
                    );
                    self.store.delete(&record.slot).await?;
                    claims.remove(&record.slot);
                }
            }
        }

        Ok(resume)
    }

    /// Move a confirmed record out of temporary storage.
    pub async fn on_confirmed(&self, slot: &RecordSlot) -> Result<ConfirmedRecord> {
        let confirmed = self.store.confirm(slot).await?;
        self.release(slot).await;
        tracing::info!(
            record_id = %confirmed.record_id,
            seq = confirmed.seq,
            record_type = %confirmed.record_type,
            "record confirmed"
        );
        Ok(confirmed)
    }

    /// Delete a record whose digest was not confirmed.
    pub async fn on_invalid(&self, slot: &RecordSlot) -> Result<()> {
        tracing::warn!(slot = %slot, "deleting unconfirmed record");
        let deleted = self.store.delete(slot).await;
        self.release(slot).await;
        deleted
    }

    /// Purge a journal backlog up to and including the named record.
    ///
    /// Records with a sequence at or below the named record's are deleted
    /// together. When no temporary record carries `record_id`, the whole
    /// backlog is purged. Only records unclaimed or held by `owner` count.
    ///
    /// # Returns
    /// Ids of the purged records that had a readable status marker.
    pub async fn on_journal_missing(
        &self,
        publisher_id: &PublisherId,
        record_id: &RecordId,
        owner: SessionId,
    ) -> Result<Vec<RecordId>> {
        let mut claims = self.claims.write().await;
        let records = self.visible_journals(&claims, publisher_id, &owner).await?;
        let cutoff = records
            .iter()
            .find(|r| r.record_id() == Some(record_id))
            .map(|r| r.slot.seq);

        if cutoff.is_none() {
            tracing::warn!(
                publisher_id = %publisher_id,
                record_id = %record_id,
                "journal-missing for unknown record, purging backlog"
            );
        }

        let mut purged = Vec::new();
        for record in records {
            if cutoff.is_some_and(|seq| record.slot.seq > seq) {
                continue;
            }
            self.store.delete(&record.slot).await?;
            claims.remove(&record.slot);
            if let Some(status) = record.status {
                purged.push(status.record_id);
            }
        }
        Ok(purged)
    }

    /// Discard the temporary journal records `owner` may act on.
    ///
    /// Used when a resumed transfer arrives under a different record id.
    pub async fn discard_backlog(
        &self,
        publisher_id: &PublisherId,
        owner: SessionId,
    ) -> Result<usize> {
        let mut claims = self.claims.write().await;
        let records = self.visible_journals(&claims, publisher_id, &owner).await?;
        for record in &records {
            self.store.delete(&record.slot).await?;
            claims.remove(&record.slot);
        }
        if !records.is_empty() {
            tracing::warn!(
                publisher_id = %publisher_id,
                count = records.len(),
                "discarded journal backlog"
            );
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use jalop_net_core::{RecordLengths, RecordPart};

    fn publisher() -> PublisherId {
        PublisherId::parse("c1f2a3b4-d5e6-4f70-8192-a3b4c5d6e7f8").unwrap()
    }

    fn owner() -> SessionId {
        SessionId::parse("5e0c1d2a-3b4c-4d5e-8f60-718293a4b5c6").unwrap()
    }

    async fn partial_journal(
        store: &MemoryRecordStore,
        id: &str,
        declared: u64,
        received: &[u8],
    ) -> RecordSlot {
        let slot = store
            .create(
                &publisher(),
                RecordType::Journal,
                &RecordId::from(id),
                RecordLengths {
                    system_metadata: 3,
                    application_metadata: 2,
                    payload: declared,
                },
            )
            .await
            .unwrap();
        store.append(&slot, RecordPart::SystemMetadata, b"sys").await.unwrap();
        store.append(&slot, RecordPart::ApplicationMetadata, b"ap").await.unwrap();
        if !received.is_empty() {
            store.append(&slot, RecordPart::Payload, received).await.unwrap();
        }
        slot
    }

    #[tokio::test]
    async fn test_find_resumable_partial() {
        let store = Arc::new(MemoryRecordStore::new());
        let slot = partial_journal(&store, "j1", 10, b"abcd").await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        let resume = policy.find_resumable(&publisher(), owner()).await.unwrap().unwrap();
        assert_eq!(resume.record_id, RecordId::from("j1"));
        assert_eq!(resume.offset, 4);
        assert_eq!(resume.remaining(), 6);

        assert_eq!(
            store.read_part(&slot, RecordPart::SystemMetadata).await,
            Some(Vec::new())
        );
        assert_eq!(store.read_payload(&slot).await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_missing_status_is_purged() {
        let store = Arc::new(MemoryRecordStore::new());
        let slot = partial_journal(&store, "j1", 10, b"abcd").await;
        store.drop_status(&slot).await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        assert_eq!(policy.find_resumable(&publisher(), owner()).await.unwrap(), None);
        assert!(store
            .list_temp(&publisher(), RecordType::Journal)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fully_uploaded_is_not_resumable() {
        let store = Arc::new(MemoryRecordStore::new());
        partial_journal(&store, "j1", 4, b"abcd").await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        assert_eq!(policy.find_resumable(&publisher(), owner()).await.unwrap(), None);
        assert!(store
            .list_temp(&publisher(), RecordType::Journal)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_only_first_record_resumes() {
        let store = Arc::new(MemoryRecordStore::new());
        partial_journal(&store, "j1", 10, b"ab").await;
        partial_journal(&store, "j2", 10, b"abc").await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        let resume = policy.find_resumable(&publisher(), owner()).await.unwrap().unwrap();
        assert_eq!(resume.record_id, RecordId::from("j1"));
        let left = store.list_temp(&publisher(), RecordType::Journal).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id(), Some(&RecordId::from("j1")));
    }

    #[tokio::test]
    async fn test_journal_missing_cascades_to_older() {
        let store = Arc::new(MemoryRecordStore::new());
        for id in ["a", "b", "c"] {
            partial_journal(&store, id, 10, b"x").await;
        }
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        let purged = policy
            .on_journal_missing(&publisher(), &RecordId::from("b"), owner())
            .await
            .unwrap();
        assert_eq!(purged, vec![RecordId::from("a"), RecordId::from("b")]);

        let left = store.list_temp(&publisher(), RecordType::Journal).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id(), Some(&RecordId::from("c")));
    }

    #[tokio::test]
    async fn test_journal_missing_unknown_purges_all() {
        let store = Arc::new(MemoryRecordStore::new());
        partial_journal(&store, "a", 10, b"x").await;
        partial_journal(&store, "b", 10, b"x").await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        let purged = policy
            .on_journal_missing(&publisher(), &RecordId::from("zzz"), owner())
            .await
            .unwrap();
        assert_eq!(purged.len(), 2);
        assert!(store
            .list_temp(&publisher(), RecordType::Journal)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_confirm_and_invalid_outcomes() {
        let store = Arc::new(MemoryRecordStore::new());
        let keep = partial_journal(&store, "keep", 1, b"x").await;
        let drop = partial_journal(&store, "drop", 1, b"x").await;
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));

        let confirmed = policy.on_confirmed(&keep).await.unwrap();
        assert_eq!(confirmed.record_id, RecordId::from("keep"));
        policy.on_invalid(&drop).await.unwrap();

        assert!(store
            .list_temp(&publisher(), RecordType::Journal)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list_confirmed(RecordType::Journal).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claimed_records_survive_recovery() {
        let store = Arc::new(MemoryRecordStore::new());
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));
        let live = SessionId::generate();

        // A completed record another session is waiting on.
        let slot = policy
            .open_record(
                live,
                &publisher(),
                RecordType::Journal,
                &RecordId::from("busy"),
                RecordLengths {
                    system_metadata: 3,
                    application_metadata: 0,
                    payload: 2,
                },
            )
            .await
            .unwrap();
        store.append(&slot, RecordPart::SystemMetadata, b"sys").await.unwrap();
        store.append(&slot, RecordPart::Payload, b"ok").await.unwrap();

        assert_eq!(policy.find_resumable(&publisher(), owner()).await.unwrap(), None);
        assert_eq!(policy.discard_backlog(&publisher(), owner()).await.unwrap(), 0);
        let purged = policy
            .on_journal_missing(&publisher(), &RecordId::from("busy"), owner())
            .await
            .unwrap();
        assert!(purged.is_empty());

        assert_eq!(policy.owner(&slot).await, Some(live));
        assert!(store.status(&slot).await.unwrap().is_some());
        assert_eq!(policy.on_confirmed(&slot).await.unwrap().record_id, RecordId::from("busy"));
        assert_eq!(policy.owner(&slot).await, None);
    }

    #[tokio::test]
    async fn test_released_record_becomes_resumable() {
        let store = Arc::new(MemoryRecordStore::new());
        let policy = JournalRecoveryPolicy::new(Arc::clone(&store));
        let earlier = SessionId::generate();

        let slot = policy
            .open_record(
                earlier,
                &publisher(),
                RecordType::Journal,
                &RecordId::from("j1"),
                RecordLengths {
                    system_metadata: 3,
                    application_metadata: 0,
                    payload: 10,
                },
            )
            .await
            .unwrap();
        store.append(&slot, RecordPart::SystemMetadata, b"sys").await.unwrap();
        store.append(&slot, RecordPart::Payload, b"abc").await.unwrap();
        assert_eq!(policy.find_resumable(&publisher(), owner()).await.unwrap(), None);

        assert_eq!(policy.release_owner(&earlier).await, 1);
        let resume = policy.find_resumable(&publisher(), owner()).await.unwrap().unwrap();
        assert_eq!(resume.offset, 3);
        assert_eq!(policy.owner(&slot).await, Some(owner()));
    }
}
