//! The per-session digest ledger.
//!
//! Tracks every completed record whose digest is owed a verdict. Entries
//! are kept in completion order, so challenge batches are FIFO.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use jalop_net_core::{DigestStatus, DigestValue, RecordId};

use crate::messages::{DigestPair, DigestResponseEntry};

/// State of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Invalid,
    Unknown,
}

/// A digest owed a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub record_id: RecordId,
    pub local_digest: DigestValue,
    pub peer_digest: Option<DigestValue>,
    pub status: EntryStatus,
    /// Whether the entry went out in a challenge batch not yet answered.
    pub challenged: bool,
    /// When the entry entered the pending window.
    pub admitted_at: Instant,
}

/// Result of [`DigestLedger::record_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The entry is pending.
    Admitted,
    /// The pending window is full. The entry is queued, not dropped, and
    /// the caller must stop taking records until the window drains.
    Backpressure,
}

/// A verdict for one record named in a response batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Invalid,
    Unknown,
    /// The ledger holds no entry for this record id.
    SyncFailure,
    /// The peer's status token was not recognized. The entry stays pending.
    BadStatus,
}

/// Per-session bounded map of pending digests.
#[derive(Debug)]
pub struct DigestLedger {
    max_pending: usize,
    timeout: Duration,
    pending: VecDeque<DigestEntry>,
    overflow: VecDeque<(RecordId, DigestValue)>,
    /// Recently resolved ids, so a repeated verdict is a no-op.
    resolved: VecDeque<RecordId>,
}

impl DigestLedger {
    pub fn new(max_pending: usize, timeout: Duration) -> Self {
        Self {
            max_pending: max_pending.max(1),
            timeout,
            pending: VecDeque::new(),
            overflow: VecDeque::new(),
            resolved: VecDeque::new(),
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.overflow.is_empty()
    }

    /// Whether new records must be refused.
    pub fn is_backpressured(&self) -> bool {
        !self.overflow.is_empty() || self.pending.len() >= self.max_pending
    }

    /// Whether the ledger holds `record_id`, pending or queued.
    pub fn contains(&self, record_id: &RecordId) -> bool {
        self.pending.iter().any(|e| &e.record_id == record_id)
            || self.overflow.iter().any(|(id, _)| id == record_id)
    }

    pub fn entry(&self, record_id: &RecordId) -> Option<&DigestEntry> {
        self.pending.iter().find(|e| &e.record_id == record_id)
    }

    /// Pending entries in completion order.
    pub fn entries(&self) -> impl Iterator<Item = &DigestEntry> {
        self.pending.iter()
    }

    /// Register a completed record's digest.
    pub fn record_completed(
        &mut self,
        record_id: RecordId,
        local_digest: DigestValue,
        now: Instant,
    ) -> Admission {
        if self.is_backpressured() {
            tracing::debug!(record_id = %record_id, "digest ledger full, queueing entry");
            self.overflow.push_back((record_id, local_digest));
            return Admission::Backpressure;
        }
        self.pending.push_back(DigestEntry {
            record_id,
            local_digest,
            peer_digest: None,
            status: EntryStatus::Pending,
            challenged: false,
            admitted_at: now,
        });
        Admission::Admitted
    }

    /// Unchallenged pending entries, in completion order. Marks them challenged.
    pub fn challenge_batch(&mut self) -> Vec<DigestPair> {
        self.pending
            .iter_mut()
            .filter(|e| !e.challenged)
            .map(|e| {
                e.challenged = true;
                DigestPair {
                    record_id: e.record_id.clone(),
                    digest: e.local_digest.clone(),
                }
            })
            .collect()
    }

    /// Apply a response batch.
    ///
    /// Every named pending entry leaves the window with a verdict. A
    /// `confirmed` status that carries a digest is checked byte-for-byte
    /// against the local digest. Ids the ledger never held yield
    /// [`Verdict::SyncFailure`]; ids resolved moments ago are ignored.
    /// Challenged entries the batch omits go back to unchallenged.
    ///
    /// # Returns
    /// Verdicts in batch order.
    pub fn apply_responses(
        &mut self,
        batch: &[DigestResponseEntry],
        now: Instant,
    ) -> Vec<(RecordId, Verdict)> {
        let mut verdicts = Vec::with_capacity(batch.len());
        let mut answered: Vec<&RecordId> = Vec::with_capacity(batch.len());

        for response in batch {
            let Some(idx) = self
                .pending
                .iter()
                .position(|e| e.record_id == response.record_id)
            else {
                if self.resolved.contains(&response.record_id) {
                    tracing::debug!(record_id = %response.record_id, "repeated verdict ignored");
                } else {
                    verdicts.push((response.record_id.clone(), Verdict::SyncFailure));
                }
                continue;
            };

            let Some(status) = DigestStatus::parse(&response.status) else {
                verdicts.push((response.record_id.clone(), Verdict::BadStatus));
                continue;
            };
            answered.push(&response.record_id);

            let Some(mut entry) = self.pending.remove(idx) else {
                continue;
            };
            entry.peer_digest = response.digest.clone();
            entry.status = match status {
                DigestStatus::Confirmed => match &entry.peer_digest {
                    Some(peer) if peer != &entry.local_digest => EntryStatus::Invalid,
                    _ => EntryStatus::Confirmed,
                },
                DigestStatus::Invalid => EntryStatus::Invalid,
                DigestStatus::Unknown => EntryStatus::Unknown,
            };
            let verdict = match entry.status {
                EntryStatus::Confirmed => Verdict::Confirmed,
                EntryStatus::Invalid => Verdict::Invalid,
                EntryStatus::Unknown | EntryStatus::Pending => Verdict::Unknown,
            };
            self.remember(entry.record_id.clone());
            verdicts.push((entry.record_id, verdict));
        }

        for entry in self.pending.iter_mut() {
            if entry.challenged && !answered.contains(&&entry.record_id) {
                entry.challenged = false;
            }
        }

        self.promote(now);
        verdicts
    }

    /// Evict pending entries older than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<DigestEntry> {
        let timeout = self.timeout;
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|e| now.saturating_duration_since(e.admitted_at) >= timeout);
        self.pending = kept.into();
        for entry in &expired {
            self.remember(entry.record_id.clone());
        }
        if !expired.is_empty() {
            self.promote(now);
        }
        expired
    }

    /// Drop an entry without a verdict, pending or queued.
    pub fn remove(&mut self, record_id: &RecordId) -> bool {
        let before = self.pending.len() + self.overflow.len();
        self.pending.retain(|e| &e.record_id != record_id);
        self.overflow.retain(|(id, _)| id != record_id);
        let removed = before != self.pending.len() + self.overflow.len();
        if removed {
            self.promote(Instant::now());
        }
        removed
    }

    /// Drop every entry, returning their ids.
    pub fn clear(&mut self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.pending.drain(..).map(|e| e.record_id).collect();
        ids.extend(self.overflow.drain(..).map(|(id, _)| id));
        ids
    }

    fn promote(&mut self, now: Instant) {
        while self.pending.len() < self.max_pending {
            let Some((record_id, local_digest)) = self.overflow.pop_front() else {
                break;
            };
            self.pending.push_back(DigestEntry {
                record_id,
                local_digest,
                peer_digest: None,
                status: EntryStatus::Pending,
                challenged: false,
                admitted_at: now,
            });
        }
    }

    fn remember(&mut self, record_id: RecordId) {
        if self.resolved.len() >= self.max_pending {
            self.resolved.pop_front();
        }
        self.resolved.push_back(record_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(b: u8) -> DigestValue {
        DigestValue::from_bytes(vec![b; 32])
    }

    fn response(id: &str, status: &str) -> DigestResponseEntry {
        DigestResponseEntry {
            record_id: RecordId::from(id),
            status: status.into(),
            digest: None,
        }
    }

    fn ledger(max: usize) -> DigestLedger {
        DigestLedger::new(max, Duration::from_secs(120))
    }

    #[test]
    fn test_challenge_batch_is_fifo_and_once() {
        let now = Instant::now();
        let mut l = ledger(8);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            l.record_completed(RecordId::from(*id), digest(i as u8), now);
        }
        let batch = l.challenge_batch();
        let ids: Vec<_> = batch.iter().map(|p| p.record_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(l.challenge_batch().is_empty());
    }

    #[test]
    fn test_apply_exact_batch_clears_pending() {
        let now = Instant::now();
        let mut l = ledger(8);
        l.record_completed(RecordId::from("a"), digest(1), now);
        l.record_completed(RecordId::from("b"), digest(2), now);
        l.challenge_batch();

        let verdicts = l.apply_responses(
            &[response("a", "confirmed"), response("b", "INVALID")],
            now,
        );
        assert_eq!(
            verdicts,
            vec![
                (RecordId::from("a"), Verdict::Confirmed),
                (RecordId::from("b"), Verdict::Invalid),
            ]
        );
        assert_eq!(l.pending_len(), 0);
    }

    #[test]
    fn test_unknown_id_is_sync_failure() {
        let now = Instant::now();
        let mut l = ledger(8);
        let verdicts = l.apply_responses(&[response("ghost", "confirmed")], now);
        assert_eq!(verdicts, vec![(RecordId::from("ghost"), Verdict::SyncFailure)]);
    }

    #[test]
    fn test_confirming_twice_is_noop() {
        let now = Instant::now();
        let mut l = ledger(8);
        l.record_completed(RecordId::from("a"), digest(1), now);
        l.challenge_batch();
        l.apply_responses(&[response("a", "confirmed")], now);
        assert!(l.apply_responses(&[response("a", "confirmed")], now).is_empty());
    }

    #[test]
    fn test_omitted_entries_are_rechallenged() {
        let now = Instant::now();
        let mut l = ledger(8);
        l.record_completed(RecordId::from("a"), digest(1), now);
        l.record_completed(RecordId::from("b"), digest(2), now);
        l.challenge_batch();

        l.apply_responses(&[response("a", "confirmed")], now);
        let again = l.challenge_batch();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].record_id, RecordId::from("b"));
    }

    #[test]
    fn test_confirmed_with_mismatched_digest_is_invalid() {
        let now = Instant::now();
        let mut l = ledger(8);
        l.record_completed(RecordId::from("a"), digest(1), now);
        let mut r = response("a", "confirmed");
        r.digest = Some(digest(9));
        assert_eq!(
            l.apply_responses(&[r], now),
            vec![(RecordId::from("a"), Verdict::Invalid)]
        );
    }

    #[test]
    fn test_bad_status_keeps_entry() {
        let now = Instant::now();
        let mut l = ledger(8);
        l.record_completed(RecordId::from("a"), digest(1), now);
        assert_eq!(
            l.apply_responses(&[response("a", "maybe")], now),
            vec![(RecordId::from("a"), Verdict::BadStatus)]
        );
        assert!(l.contains(&RecordId::from("a")));
    }

    #[test]
    fn test_overflow_is_queued_not_dropped() {
        let now = Instant::now();
        let mut l = ledger(2);
        assert_eq!(l.record_completed(RecordId::from("a"), digest(1), now), Admission::Admitted);
        assert_eq!(l.record_completed(RecordId::from("b"), digest(2), now), Admission::Admitted);
        assert!(l.is_backpressured());
        assert_eq!(
            l.record_completed(RecordId::from("c"), digest(3), now),
            Admission::Backpressure
        );
        assert_eq!(l.pending_len(), 2);
        assert_eq!(l.overflow_len(), 1);

        l.challenge_batch();
        l.apply_responses(&[response("a", "confirmed")], now);
        assert_eq!(l.pending_len(), 2);
        assert_eq!(l.overflow_len(), 0);
        let batch = l.challenge_batch();
        assert_eq!(batch[0].record_id, RecordId::from("c"));
    }

    #[test]
    fn test_expire_evicts_old_entries() {
        let start = Instant::now();
        let mut l = DigestLedger::new(8, Duration::from_secs(10));
        l.record_completed(RecordId::from("old"), digest(1), start);
        l.record_completed(RecordId::from("new"), digest(2), start + Duration::from_secs(8));

        let expired = l.expire(start + Duration::from_secs(11));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].record_id, RecordId::from("old"));
        assert_eq!(l.pending_len(), 1);
    }
}
